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

#[macro_use]
extern crate spectral;

use rstest::*;
use secrecy::SecretString;
use serde_json::{json, Value};
use spectral::prelude::*;

use datatops::backend::{Backend, FileBackend, TableBackend};
use datatops::clock::FixedClock;
use datatops::project::{Credentials, Project};
use datatops::record::TIMESTAMP_KEY;
use datatops::server::{Envelope, Reply, ReplyStatus, Server, ServerConfig, VERSION};
use datatops::table::MemoryTableService;
use datatops::Error;
use common::*;

mod common;

const SECRET: &str = "open sesame";

fn server<B: Backend>(backend: B) -> Server<B> {
    Server::new(backend, ServerConfig::default()).with_clock(FixedClock::at_unix(TEST_TIME))
}

fn gated_server<B: Backend>(backend: B) -> Server<B> {
    let config = ServerConfig {
        project_creation_secret: Some(SecretString::new(String::from(SECRET))),
    };
    Server::new(backend, config).with_clock(FixedClock::at_unix(TEST_TIME))
}

fn error(status: ReplyStatus, message: &str) -> Reply {
    Reply {
        status,
        body: Envelope::Error {
            message: String::from(message),
        },
    }
}

/// Return the project in a successful creation reply.
fn created_project(reply: Reply) -> Project {
    match reply {
        Reply {
            status: ReplyStatus::Ok,
            body: Envelope::Success { data: Some(data) },
        } => serde_json::from_value(data).unwrap(),
        other => panic!("project was not created: {:?}", other),
    }
}

/// Return the records in a successful listing reply.
fn listed_records(reply: Reply) -> Vec<Value> {
    match reply {
        Reply {
            status: ReplyStatus::Ok,
            body: Envelope::Success {
                data: Some(Value::Array(records)),
            },
        } => records,
        other => panic!("records were not listed: {:?}", other),
    }
}

fn alpha_scenario<B: Backend>(server: &mut Server<B>) -> anyhow::Result<()> {
    let project = created_project(server.create_project(Some("alpha"), None)?);
    let credentials = Credentials::user(project.user_key.clone());

    let reply = server.store("alpha", &credentials, Some(json!({"x": 1})))?;
    assert_that!(reply).is_equal_to(Reply {
        status: ReplyStatus::Ok,
        body: Envelope::Success { data: None },
    });

    let records = listed_records(server.list_data("alpha", &credentials, None)?);
    assert_that!(records).has_length(1);
    assert_that!(records[0]["x"]).is_equal_to(json!(1));
    assert!(records[0].get(TIMESTAMP_KEY).is_some());

    let wrong = Credentials::user("zzzzzzzz");
    assert_that!(listed_records(server.list_data("alpha", &wrong, None)?)).is_empty();

    let reply = server.create_project(Some("alpha"), None)?;
    assert_that!(reply).is_equal_to(error(
        ReplyStatus::BadRequest,
        "Project could not be created. (Maybe it already exists?)",
    ));

    // The first keys still work after the failed second creation.
    let admin = Credentials::admin(project.admin_key);
    assert_that!(listed_records(server.list_data("alpha", &admin, None)?)).has_length(1);

    Ok(())
}

#[rstest]
fn file_alpha_scenario(file_backend: WithTempDir<FileBackend>) -> anyhow::Result<()> {
    alpha_scenario(&mut server(file_backend.value))
}

#[rstest]
fn table_alpha_scenario(table_backend: TableBackend<MemoryTableService>) -> anyhow::Result<()> {
    alpha_scenario(&mut server(table_backend))
}

#[rstest]
fn server_stamps_iso_timestamps(file_backend: WithTempDir<FileBackend>) -> anyhow::Result<()> {
    let mut server = server(file_backend.value);
    let project = created_project(server.create_project(Some("alpha"), None)?);
    let credentials = Credentials::user(project.user_key);

    server.store(
        "alpha",
        &credentials,
        Some(json!({"x": 1, TIMESTAMP_KEY: "2001-02-03T04:05:06Z"})),
    )?;

    let records = listed_records(server.list_data("alpha", &credentials, None)?);
    assert_that!(records[0][TIMESTAMP_KEY]).is_equal_to(json!("2020-09-13T12:26:40Z"));

    Ok(())
}

#[rstest]
fn table_backend_replaces_server_timestamp(
    table_backend: TableBackend<MemoryTableService>,
) -> anyhow::Result<()> {
    let mut server = server(table_backend);
    let project = created_project(server.create_project(Some("alpha"), None)?);
    let credentials = Credentials::user(project.user_key);

    server.store("alpha", &credentials, Some(json!({"x": 1})))?;

    let records = listed_records(server.list_data("alpha", &credentials, None)?);
    assert_that!(records[0][TIMESTAMP_KEY]).is_equal_to(json!(TEST_TIME));

    Ok(())
}

#[rstest]
fn creation_gate_is_checked_first(file_backend: WithTempDir<FileBackend>) -> anyhow::Result<()> {
    let mut server = gated_server(file_backend.value);
    let forbidden = error(ReplyStatus::Forbidden, "Project could not be created.");

    assert_that!(server.create_project(Some("alpha"), None)?).is_equal_to(&forbidden);
    assert_that!(server.create_project(Some("alpha"), Some("wrong"))?).is_equal_to(&forbidden);
    assert_that!(server.create_project(None, None)?).is_equal_to(&forbidden);
    assert_that!(server.backend_mut().list_projects()?).is_empty();

    created_project(server.create_project(Some("alpha"), Some(SECRET))?);
    assert_that!(server.backend_mut().list_projects()?).is_equal_to(vec![String::from("alpha")]);

    Ok(())
}

#[rstest]
fn missing_input_is_a_bad_request(file_backend: WithTempDir<FileBackend>) -> anyhow::Result<()> {
    let mut server = server(file_backend.value);

    assert_that!(server.create_project(None, None)?)
        .is_equal_to(error(ReplyStatus::BadRequest, "Missing project name."));

    let project = created_project(server.create_project(Some("alpha"), None)?);
    let credentials = Credentials::user(project.user_key);

    assert_that!(server.store("alpha", &credentials, None)?)
        .is_equal_to(error(ReplyStatus::BadRequest, "Missing data."));
    assert_that!(server.store("alpha", &credentials, Some(Value::Null))?)
        .is_equal_to(error(ReplyStatus::BadRequest, "Missing data."));
    assert_that!(server.store("alpha", &credentials, Some(json!([1, 2])))?)
        .is_equal_to(error(ReplyStatus::BadRequest, "Data must be a JSON object."));

    for limit in &["-1", "ten", "1.5"] {
        assert_that!(server.list_data("alpha", &credentials, Some(*limit))?)
            .is_equal_to(error(ReplyStatus::BadRequest, "Invalid limit."));
    }

    let reply = server.create_project(Some("../escape"), None)?;
    assert_that!(reply.status).is_equal_to(ReplyStatus::BadRequest);

    Ok(())
}

#[rstest]
fn unauthorized_store_is_forbidden(file_backend: WithTempDir<FileBackend>) -> anyhow::Result<()> {
    let mut server = server(file_backend.value);
    created_project(server.create_project(Some("alpha"), None)?);

    let not_authorized = error(ReplyStatus::Forbidden, "Not authorized.");
    for credentials in &[Credentials::default(), Credentials::user("zzzzzzzz")] {
        assert_that!(server.store("alpha", credentials, Some(json!({"x": 1})))?)
            .is_equal_to(&not_authorized);
    }
    assert_that!(server.store("missing", &Credentials::default(), Some(json!({"x": 1})))?)
        .is_equal_to(&not_authorized);

    Ok(())
}

#[rstest]
fn limit_is_parsed(table_backend: TableBackend<MemoryTableService>) -> anyhow::Result<()> {
    let mut server = server(table_backend);
    let project = created_project(server.create_project(Some("alpha"), None)?);
    let credentials = Credentials::user(project.user_key);

    for x in 0..3 {
        server.store("alpha", &credentials, Some(json!({ "x": x })))?;
    }

    assert_that!(listed_records(server.list_data("alpha", &credentials, Some("0"))?)).is_empty();
    assert_that!(listed_records(server.list_data("alpha", &credentials, Some("2"))?))
        .has_length(2);
    assert_that!(listed_records(server.list_data("alpha", &credentials, Some("10"))?))
        .has_length(3);

    Ok(())
}

#[rstest]
fn substrate_errors_are_propagated(
    file_backend: WithTempDir<FileBackend>,
) -> anyhow::Result<()> {
    let mut server = server(file_backend.value);
    let project = created_project(server.create_project(Some("alpha"), None)?);
    std::fs::write(server.backend().path().join("alpha.json"), "not json")?;

    let credentials = Credentials::user(project.user_key);
    assert_that!(server.list_data("alpha", &credentials, None))
        .is_err_variant(Error::Corrupt(String::new()));

    Ok(())
}

#[rstest]
fn index_reports_version_and_time(file_backend: WithTempDir<FileBackend>) {
    let server = server(file_backend.value);
    let info = server.index();

    assert_that!(info.status.as_str()).is_equal_to("success");
    assert_that!(info.version.as_str()).is_equal_to(VERSION);
    assert_that!(info.message.as_str()).is_equal_to("Welcome to the Datatops API!");
    assert_that!(info.server_time).is_equal_to(TEST_TIME as f64);
}
