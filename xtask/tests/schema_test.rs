// SPDX-License-Identifier: MIT OR Apache-2.0
//! Validates the generated server-config JSON schema.

use schemars::schema_for;

#[test]
fn server_config_schema_covers_the_settings() {
    let schema = schema_for!(mt_config::ServerConfig);
    let value = serde_json::to_value(&schema).unwrap();

    let obj = value.as_object().expect("schema should be a JSON object");
    assert!(
        obj.contains_key("$schema") || obj.contains_key("type"),
        "missing top-level schema key"
    );

    let props = value["properties"]
        .as_object()
        .expect("schema should list properties");
    for field in ["bind", "data_dir", "log_level", "login_limit", "session_ttl_secs"] {
        assert!(props.contains_key(field), "schema missing field {field}");
    }
}
