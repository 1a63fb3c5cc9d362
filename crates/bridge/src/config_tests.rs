// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::BridgeConfig;

fn parse(args: &[&str]) -> BridgeConfig {
    BridgeConfig::parse_from(args)
}

#[test]
fn defaults() {
    let config = parse(&["chatbridge"]);
    assert_eq!(config.port, 3000);
    assert_eq!(config.auth_token, None);
    assert_eq!(config.history_cap(), None);
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.hub_settings(), crate::hub::HubSettings::default());
}

#[test]
fn history_limit_sets_cap() {
    let config = parse(&["chatbridge", "--history-limit", "500"]);
    assert_eq!(config.history_cap(), Some(500));
}

#[test]
fn gateway_settings_flow_through() {
    let config = parse(&[
        "chatbridge",
        "--gateway-url",
        "http://gw:9000",
        "--gateway-token",
        "secret",
        "--request-timeout-ms",
        "1500",
    ]);
    let gateway = config.gateway();
    assert_eq!(gateway.base_url, "http://gw:9000");
    assert_eq!(gateway.auth_token.as_deref(), Some("secret"));
    assert_eq!(gateway.timeout, Duration::from_millis(1500));
}

#[test]
fn hub_settings_are_overridable() {
    let config = parse(&[
        "chatbridge",
        "--chat-fetch-limit",
        "20",
        "--self-label",
        "Me",
        "--chat-suffix",
        "@s.whatsapp.net",
    ]);
    let settings = config.hub_settings();
    assert_eq!(settings.chat_fetch_limit, 20);
    assert_eq!(settings.self_label, "Me");
    assert_eq!(settings.chat_suffix, "@s.whatsapp.net");
}
