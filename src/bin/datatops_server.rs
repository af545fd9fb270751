/*
 * Copyright 2022 Jordan Matelsky
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};
use secrecy::SecretString;
use tracing::info;
use tracing_subscriber::EnvFilter;

use datatops::backend::{Backend, FileConfig, OpenBackend};
use datatops::server::{http, Server, ServerConfig};

const DEFAULT_BIND: &str = "0.0.0.0:5000";
const DEFAULT_DATA_DIR: &str = "./datatops-data";

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(any(feature = "table-sqlite", feature = "table-dynamodb"))]
fn required_var(name: &str) -> anyhow::Result<String> {
    var(name).with_context(|| format!("The environment variable {} must be set.", name))
}

#[cfg(feature = "table-sqlite")]
fn open_sqlite() -> anyhow::Result<Box<dyn Backend>> {
    use datatops::backend::TableConfig;
    use datatops::table::SqliteTableConfig;

    let tables = SqliteTableConfig {
        path: PathBuf::from(required_var("DATATOPS_SQLITE_PATH")?),
    };
    let mut config = TableConfig::new(tables, required_var("DATATOPS_DATA_TABLE")?);
    if let Some(project_table) = var("DATATOPS_PROJECT_TABLE") {
        config.project_table = project_table;
    }

    Ok(Box::new(config.open()?))
}

#[cfg(not(feature = "table-sqlite"))]
fn open_sqlite() -> anyhow::Result<Box<dyn Backend>> {
    bail!("The sqlite backend requires the `table-sqlite` feature.")
}

#[cfg(feature = "table-dynamodb")]
fn open_dynamodb() -> anyhow::Result<Box<dyn Backend>> {
    use datatops::backend::TableConfig;
    use datatops::table::DynamoDbConfig;

    let tables = DynamoDbConfig {
        region: var("DATATOPS_REGION"),
        endpoint: var("DATATOPS_ENDPOINT"),
    };
    let mut config = TableConfig::new(tables, required_var("DATATOPS_DATA_TABLE")?);
    if let Some(project_table) = var("DATATOPS_PROJECT_TABLE") {
        config.project_table = project_table;
    }

    Ok(Box::new(config.open()?))
}

#[cfg(not(feature = "table-dynamodb"))]
fn open_dynamodb() -> anyhow::Result<Box<dyn Backend>> {
    bail!("The dynamodb backend requires the `table-dynamodb` feature.")
}

/// Open the backend selected by `DATATOPS_BACKEND`.
fn open_backend() -> anyhow::Result<Box<dyn Backend>> {
    let kind = var("DATATOPS_BACKEND").unwrap_or_else(|| String::from("file"));

    match kind.as_str() {
        "file" => {
            let path = var("DATATOPS_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
            let config = FileConfig {
                path: PathBuf::from(path),
            };
            Ok(Box::new(config.open()?))
        }
        "sqlite" => open_sqlite(),
        "dynamodb" => open_dynamodb(),
        other => bail!("Unknown backend '{}'. Expected file, sqlite or dynamodb.", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = var("DATATOPS_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'.", bind))?;

    let config = ServerConfig {
        project_creation_secret: var("DATATOPS_PROJECT_CREATION_SECRET").map(SecretString::new),
    };

    // Opening a table backend may block while tables are created.
    let backend = tokio::task::spawn_blocking(open_backend).await??;
    info!(?backend, "opened backend");

    let app = http::router(Server::new(backend, config));

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
