use config::{File, FileFormat};

use super::{RuntimeConfig, Settings, settings_builder};
use crate::engine::errors::FlowError;

#[test]
fn defaults_fill_every_field() {
    let settings: Settings = settings_builder()
        .expect("defaults apply")
        .build()
        .expect("config builds")
        .try_deserialize()
        .expect("settings deserialize");

    assert_eq!(settings.runtime.frame_size, 32768);
    assert_eq!(settings.runtime.table_budget_bytes, 32 * 1024 * 1024);
    assert_eq!(settings.runtime.spill_partitions, 16);
    assert_eq!(settings.runtime.merge_fan_in, 32);
    assert_eq!(settings.logging.stdout_level, "info");
    settings.runtime.validate().expect("defaults are valid");
}

#[test]
fn file_values_override_defaults() {
    let toml = r#"
        [runtime]
        frame_size = 4096
        spill_partitions = 4

        [logging]
        stdout_level = "warn"
    "#;

    let settings: Settings = settings_builder()
        .expect("defaults apply")
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()
        .expect("config builds")
        .try_deserialize()
        .expect("settings deserialize");

    assert_eq!(settings.runtime.frame_size, 4096);
    assert_eq!(settings.runtime.spill_partitions, 4);
    assert_eq!(settings.runtime.merge_fan_in, 32);
    assert_eq!(settings.logging.stdout_level, "warn");
    assert_eq!(settings.logging.file_level, "debug");
}

#[test]
fn validation_rejects_degenerate_values() {
    let cases = [
        RuntimeConfig {
            frame_size: 4,
            ..RuntimeConfig::default()
        },
        RuntimeConfig {
            table_budget_bytes: 0,
            ..RuntimeConfig::default()
        },
        RuntimeConfig {
            spill_partitions: 0,
            ..RuntimeConfig::default()
        },
        RuntimeConfig {
            merge_fan_in: 1,
            ..RuntimeConfig::default()
        },
    ];

    for config in cases {
        let err = config.validate().expect_err("invalid config");
        assert!(matches!(err, FlowError::InvalidSpec(_)));
    }
}
