//! Declarative expose-to-device-type resolution: an ordered,
//! first-match-wins table instead of a cascade of nested conditionals.

use crate::config::BridgeSettings;
use crate::model::DeviceTypeCode;
use crate::model::Expose;
use crate::model::Feature;
use std::collections::HashSet;

struct ExposeRule {
    name: &'static str,
    matches: fn(&Expose) -> bool,
    device_type: DeviceTypeCode,
}

fn has_leaf(expose: &Expose, property: &str) -> bool {
    expose
        .leaf_features()
        .iter()
        .any(|f| f.property.as_deref() == Some(property))
}

/// True for the composite `color_xy` expose, whose top-level feature is
/// named `color` and whose leaves are the `x`/`y` pair, not a single
/// `color`-named leaf.
fn has_xy_color(expose: &Expose) -> bool {
    expose
        .features
        .iter()
        .any(|f| f.name.as_deref() == Some("color") || f.property.as_deref() == Some("color"))
        || {
            let leaves: Vec<_> = expose
                .leaf_features()
                .iter()
                .filter_map(|f| f.property.clone())
                .collect();
            leaves.contains(&"x".to_string()) && leaves.contains(&"y".to_string())
        }
}

static TABLE: &[ExposeRule] = &[
    ExposeRule {
        name: "color-light",
        matches: |e| e.expose_type == "light" && has_xy_color(e),
        device_type: DeviceTypeCode::ColorLight,
    },
    ExposeRule {
        name: "color-temperature-light",
        matches: |e| e.expose_type == "light" && has_leaf(e, "color_temp"),
        device_type: DeviceTypeCode::ColorTemperatureLight,
    },
    ExposeRule {
        name: "dimmable-light",
        matches: |e| e.expose_type == "light" && has_leaf(e, "brightness"),
        device_type: DeviceTypeCode::DimmableLight,
    },
    ExposeRule {
        name: "on-off-light",
        matches: |e| e.expose_type == "light",
        device_type: DeviceTypeCode::OnOffLight,
    },
    ExposeRule {
        name: "cover",
        matches: |e| e.expose_type == "cover",
        device_type: DeviceTypeCode::Cover,
    },
    ExposeRule {
        name: "lock",
        matches: |e| e.expose_type == "lock",
        device_type: DeviceTypeCode::Lock,
    },
    ExposeRule {
        name: "thermostat",
        matches: |e| e.expose_type == "climate",
        device_type: DeviceTypeCode::Thermostat,
    },
    ExposeRule {
        name: "generic-switch-action",
        matches: |e| e.expose_type == "enum" && e.property.as_deref() == Some("action"),
        device_type: DeviceTypeCode::GenericSwitch,
    },
    ExposeRule {
        name: "air-quality",
        matches: |e| e.expose_type == "enum" && e.property.as_deref() == Some("air_quality"),
        device_type: DeviceTypeCode::AirQualitySensor,
    },
    ExposeRule {
        name: "contact-sensor",
        matches: |e| e.expose_type == "binary" && e.property.as_deref() == Some("contact"),
        device_type: DeviceTypeCode::ContactSensor,
    },
    ExposeRule {
        name: "water-leak-sensor",
        matches: |e| e.expose_type == "binary" && e.property.as_deref() == Some("water_leak"),
        device_type: DeviceTypeCode::WaterLeakSensor,
    },
    ExposeRule {
        name: "smoke-sensor",
        matches: |e| e.expose_type == "binary" && e.property.as_deref() == Some("smoke"),
        device_type: DeviceTypeCode::SmokeSensor,
    },
    ExposeRule {
        name: "carbon-monoxide-sensor",
        matches: |e| e.expose_type == "binary" && e.property.as_deref() == Some("carbon_monoxide"),
        device_type: DeviceTypeCode::CarbonMonoxideSensor,
    },
    ExposeRule {
        name: "occupancy-sensor",
        matches: |e| e.expose_type == "binary" && e.property.as_deref() == Some("occupancy"),
        device_type: DeviceTypeCode::OccupancySensor,
    },
    ExposeRule {
        name: "temperature-sensor",
        matches: |e| e.expose_type == "numeric" && e.property.as_deref() == Some("temperature"),
        device_type: DeviceTypeCode::TemperatureSensor,
    },
    ExposeRule {
        name: "humidity-sensor",
        matches: |e| e.expose_type == "numeric" && e.property.as_deref() == Some("humidity"),
        device_type: DeviceTypeCode::HumiditySensor,
    },
    ExposeRule {
        name: "pressure-sensor",
        matches: |e| e.expose_type == "numeric" && e.property.as_deref() == Some("pressure"),
        device_type: DeviceTypeCode::PressureSensor,
    },
    ExposeRule {
        name: "illuminance-sensor",
        matches: |e| {
            e.expose_type == "numeric"
                && matches!(e.property.as_deref(), Some("illuminance") | Some("illuminance_lux"))
        },
        device_type: DeviceTypeCode::IlluminanceSensor,
    },
    ExposeRule {
        name: "relay-switch",
        matches: |e| e.expose_type == "switch",
        device_type: DeviceTypeCode::Switch,
    },
];

/// Resolve the set of northbound device types an entity's `exposes` list
/// maps to, first-match-wins per expose entry, then apply the
/// `outletList`/`switchList`/`lightList` friendly-name overrides.
pub fn resolve_device_types(
    friendly_name: &str,
    exposes: &[Expose],
    settings: &BridgeSettings,
) -> HashSet<DeviceTypeCode> {
    let mut resolved = HashSet::new();
    for expose in exposes {
        if let Some(rule) = TABLE.iter().find(|rule| (rule.matches)(expose)) {
            tracing::debug!(
                "expose {:?} on {friendly_name:?} resolved by rule {:?}",
                expose.expose_type,
                rule.name
            );
            resolved.insert(rule.device_type);
        }
    }

    if settings.outlet_list.iter().any(|n| n == friendly_name) {
        resolved.remove(&DeviceTypeCode::Switch);
        resolved.insert(DeviceTypeCode::Outlet);
    } else if settings.switch_list.iter().any(|n| n == friendly_name) {
        resolved.remove(&DeviceTypeCode::Outlet);
        resolved.insert(DeviceTypeCode::Switch);
    }
    if settings.light_list.iter().any(|n| n == friendly_name) && resolved.is_empty() {
        resolved.insert(DeviceTypeCode::OnOffLight);
    }

    resolved
}

/// Drop any expose (or nested feature) whose `property` is on the
/// `featureBlackList`/`deviceFeatureBlackList`, before device-type
/// resolution ever sees it.
pub fn filter_exposes(exposes: &[Expose], friendly_name: &str, settings: &BridgeSettings) -> Vec<Expose> {
    exposes
        .iter()
        .filter(|e| e.property.as_deref().is_none_or(|p| settings.feature_allowed(friendly_name, p)))
        .map(|e| Expose {
            features: filter_features(&e.features, friendly_name, settings),
            ..e.clone()
        })
        .collect()
}

fn filter_features(features: &[Feature], friendly_name: &str, settings: &BridgeSettings) -> Vec<Feature> {
    features
        .iter()
        .filter(|f| f.property.as_deref().is_none_or(|p| settings.feature_allowed(friendly_name, p)))
        .map(|f| Feature {
            features: filter_features(&f.features, friendly_name, settings),
            ..f.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feature(property: &str) -> Feature {
        Feature {
            name: Some(property.to_string()),
            feature_type: None,
            property: Some(property.to_string()),
            access: 7,
            unit: None,
            value_on: None,
            value_off: None,
            value_toggle: None,
            value_min: None,
            value_max: None,
            value_step: None,
            values: vec![],
            presets: vec![],
            features: vec![],
        }
    }

    fn expose(expose_type: &str, property: Option<&str>, features: Vec<Feature>) -> Expose {
        Expose {
            expose_type: expose_type.to_string(),
            name: None,
            property: property.map(|p| p.to_string()),
            access: 0,
            features,
            endpoint: None,
        }
    }

    #[test]
    fn simple_on_off_light_resolves_to_on_off_light() {
        let exposes = vec![expose("light", None, vec![feature("state")])];
        let types = resolve_device_types("Lamp1", &exposes, &BridgeSettings::default());
        assert_eq!(types, [DeviceTypeCode::OnOffLight].into_iter().collect());
    }

    #[test]
    fn dimmable_light_with_brightness_resolves_to_dimmable_light() {
        let exposes = vec![expose(
            "light",
            None,
            vec![feature("state"), feature("brightness")],
        )];
        let types = resolve_device_types("Lamp1", &exposes, &BridgeSettings::default());
        assert_eq!(types, [DeviceTypeCode::DimmableLight].into_iter().collect());
    }

    #[test]
    fn color_light_takes_priority_over_color_temp() {
        let xy_color = Feature {
            name: Some("color".to_string()),
            features: vec![feature("x"), feature("y")],
            ..feature("color")
        };
        let exposes = vec![expose(
            "light",
            None,
            vec![feature("color_temp"), xy_color],
        )];
        let types = resolve_device_types("Lamp1", &exposes, &BridgeSettings::default());
        assert_eq!(types, [DeviceTypeCode::ColorLight].into_iter().collect());
    }

    #[test]
    fn outlet_list_override_wins_over_relay_default() {
        let exposes = vec![expose("switch", Some("state"), vec![feature("state")])];
        let mut settings = BridgeSettings::default();
        settings.outlet_list.push("Plug1".to_string());
        let types = resolve_device_types("Plug1", &exposes, &settings);
        assert_eq!(types, [DeviceTypeCode::Outlet].into_iter().collect());
    }

    #[test]
    fn action_enum_resolves_to_generic_switch() {
        let exposes = vec![expose("enum", Some("action"), vec![])];
        let types = resolve_device_types("Button1", &exposes, &BridgeSettings::default());
        assert_eq!(types, [DeviceTypeCode::GenericSwitch].into_iter().collect());
    }

    #[test]
    fn filter_exposes_drops_black_listed_leaf_feature() {
        let exposes = vec![expose(
            "light",
            None,
            vec![feature("state"), feature("brightness")],
        )];
        let mut settings = BridgeSettings::default();
        settings.feature_black_list.push("brightness".to_string());
        let filtered = filter_exposes(&exposes, "Lamp1", &settings);
        let types = resolve_device_types("Lamp1", &filtered, &settings);
        assert_eq!(types, [DeviceTypeCode::OnOffLight].into_iter().collect());
    }

    #[test]
    fn filter_exposes_honors_per_device_black_list() {
        let exposes = vec![expose("switch", Some("state"), vec![feature("state")])];
        let mut settings = BridgeSettings::default();
        settings
            .device_feature_black_list
            .push(("Plug1".to_string(), "state".to_string()));
        let filtered = filter_exposes(&exposes, "Plug1", &settings);
        assert!(filtered.is_empty());

        let untouched = filter_exposes(&exposes, "Plug2", &settings);
        assert_eq!(untouched.len(), 1);
    }
}
