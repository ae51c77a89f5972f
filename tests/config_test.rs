//! Integration tests for configuration loading

use parkgate::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "kigali-lot-1"

[plate]
marker = "RA"
vote_quorum = 5

[entry]
vision_port = 26001
serial_device = "/dev/ttyUSB0"
serial_baud = 9600
cooldown_secs = 120

[exit]
vision_port = 26002
serial_device = "/dev/ttyUSB1"
cooldown_secs = 45

[payment]
serial_device = "/dev/ttyUSB2"

[tariff]
rate_per_hour = 600

[gate]
dwell_secs = 20
tick_ms = 50

[egress]
file = "/var/log/parkgate/sessions.jsonl"

[metrics]
interval_secs = 30
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "kigali-lot-1");
    assert_eq!(config.vote_quorum(), 5);
    assert_eq!(config.entry_vision_port(), 26001);
    assert_eq!(config.entry_cooldown_secs(), 120);
    assert_eq!(config.exit_serial_device(), "/dev/ttyUSB1");
    assert_eq!(config.exit_cooldown_secs(), 45);
    assert_eq!(config.payment_serial_device(), "/dev/ttyUSB2");
    assert_eq!(config.rate_per_hour(), 600);
    assert_eq!(config.gate_dwell_secs(), 20);
    assert_eq!(config.egress_file(), "/var/log/parkgate/sessions.jsonl");
    assert_eq!(config.metrics_interval_secs(), 30);
}

#[test]
fn test_section_defaults_fill_in() {
    let mut temp_file = NamedTempFile::new().unwrap();

    // Only the required lane sections; everything else defaulted
    let config_content = r#"
[entry]
vision_port = 25901
serial_device = "/dev/ttyACM0"
cooldown_secs = 300

[exit]
vision_port = 25902
serial_device = "/dev/ttyACM1"
cooldown_secs = 30
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.plate_marker(), "RA");
    assert_eq!(config.vote_quorum(), 3);
    assert_eq!(config.entry_serial_baud(), 9600);
    assert_eq!(config.rate_per_hour(), 500);
    assert_eq!(config.gate_dwell_secs(), 15);
    assert_eq!(config.egress_file(), "sessions.jsonl");
}

#[test]
fn test_missing_lane_section_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[entry]
vision_port = 25901
serial_device = "/dev/ttyACM0"
cooldown_secs = 300
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.site_id(), "parkgate");
    assert_eq!(config.entry_vision_port(), 25901);
    assert_eq!(config.exit_cooldown_secs(), 30);
}
