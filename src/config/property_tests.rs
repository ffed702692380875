//! Property-based tests for configuration validation

use super::*;
use proptest::prelude::*;

prop_compose! {
    fn valid_output_config(index: usize)(
        x in -4096i32..4096,
        y in -4096i32..4096,
        width in 1u32..8192,
        height in 1u32..8192,
        scale in prop_oneof![Just(1.0f64), Just(1.25), Just(1.5), Just(2.0), 0.5f64..4.0],
    ) -> OutputConfig {
        OutputConfig {
            name: format!("HEADLESS-{}", index + 1),
            x,
            y,
            width,
            height,
            scale,
        }
    }
}

prop_compose! {
    fn valid_scene_config()(
        fractional_damage_padding in any::<bool>(),
        direct_scanout in any::<bool>(),
        max_scanout_candidates in 0usize..4,
        background in "#[0-9A-Fa-f]{6}([0-9A-Fa-f]{2})?",
    ) -> SceneConfig {
        SceneConfig {
            fractional_damage_padding,
            direct_scanout,
            max_scanout_candidates,
            background,
        }
    }
}

prop_compose! {
    fn valid_config()(
        scene in valid_scene_config(),
        first in valid_output_config(0),
        second in valid_output_config(1),
        two_outputs in any::<bool>(),
        refresh_rate in 1u32..360,
        samples in 1u32..2000,
        windows in 0u32..16,
    ) -> TesseraConfig {
        let mut outputs = vec![first];
        if two_outputs {
            outputs.push(second);
        }
        TesseraConfig {
            general: GeneralConfig { refresh_rate, ..GeneralConfig::default() },
            scene,
            profiler: ProfilerConfig { samples, ..ProfilerConfig::default() },
            outputs,
            demo: DemoConfig { windows, ..DemoConfig::default() },
        }
    }
}

proptest! {
    #[test]
    fn test_generated_configs_validate(config in valid_config()) {
        prop_assert!(config.validate().is_ok());
        prop_assert!(config.scene.to_settings().is_ok());
    }

    #[test]
    fn test_toml_round_trip_preserves_config(config in valid_config()) {
        let text = toml::to_string(&config).unwrap();
        let parsed: TesseraConfig = toml::from_str(&text).unwrap();
        prop_assert_eq!(parsed, config);
    }

    #[test]
    fn test_non_positive_scale_rejected(mut config in valid_config(), scale in -10.0f64..=0.0) {
        config.outputs[0].scale = scale;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn test_viewport_covers_mode(output in valid_output_config(0)) {
        let viewport = output.viewport();
        prop_assert!((viewport.width * output.scale - output.width as f64).abs() < 1e-6);
        prop_assert!((viewport.height * output.scale - output.height as f64).abs() < 1e-6);
    }
}
