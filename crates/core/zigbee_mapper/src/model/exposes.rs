use serde::Deserialize;
use serde_json::Value;

/// A Zigbee2MQTT feature descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub feature_type: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub access: u8,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub value_on: Option<Value>,
    #[serde(default)]
    pub value_off: Option<Value>,
    #[serde(default)]
    pub value_toggle: Option<Value>,
    #[serde(default)]
    pub value_min: Option<f64>,
    #[serde(default)]
    pub value_max: Option<f64>,
    #[serde(default)]
    pub value_step: Option<f64>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub presets: Vec<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Feature {
    /// access bit 0 (value 1): this feature's current value is published.
    pub fn is_published(&self) -> bool {
        self.access & 0b001 != 0
    }

    /// access bit 1 (value 2): this feature can be set.
    pub fn is_settable(&self) -> bool {
        self.access & 0b010 != 0
    }

    /// access bit 2 (value 4): this feature can be actively queried with `get`.
    pub fn is_gettable(&self) -> bool {
        self.access & 0b100 != 0
    }
}

/// A top-level expose entry (one exposed capability group) from a device's
/// `definition.exposes` array.
#[derive(Debug, Clone, Deserialize)]
pub struct Expose {
    #[serde(rename = "type")]
    pub expose_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub access: u8,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Expose {
    /// Flatten this expose and any nested feature groups (e.g. `light`
    /// exposes nesting `state`, `brightness`, `color_temp`) into a single
    /// list of leaf features, the unit the device-type resolution table and
    /// the update pipeline both operate on.
    pub fn leaf_features(&self) -> Vec<&Feature> {
        fn collect<'a>(features: &'a [Feature], out: &mut Vec<&'a Feature>) {
            for feature in features {
                if feature.features.is_empty() {
                    out.push(feature);
                } else {
                    collect(&feature.features, out);
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.features, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_bits_decode_published_set_get() {
        let feature = Feature {
            access: 0b111,
            ..sample_feature()
        };
        assert!(feature.is_published());
        assert!(feature.is_settable());
        assert!(feature.is_gettable());
    }

    #[test]
    fn access_bit_zero_means_nothing_decoded() {
        let feature = Feature {
            access: 0,
            ..sample_feature()
        };
        assert!(!feature.is_published());
        assert!(!feature.is_settable());
        assert!(!feature.is_gettable());
    }

    #[test]
    fn leaf_features_flattens_nested_groups() {
        let expose = Expose {
            expose_type: "light".into(),
            name: None,
            property: None,
            access: 0,
            endpoint: None,
            features: vec![Feature {
                name: Some("color".into()),
                features: vec![sample_feature_named("x"), sample_feature_named("y")],
                ..sample_feature()
            }],
        };
        let leaves: Vec<_> = expose.leaf_features().iter().map(|f| f.name.clone()).collect();
        assert_eq!(leaves, vec![Some("x".to_string()), Some("y".to_string())]);
    }

    fn sample_feature() -> Feature {
        Feature {
            name: None,
            feature_type: None,
            property: None,
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

    fn sample_feature_named(name: &str) -> Feature {
        Feature {
            name: Some(name.to_string()),
            ..sample_feature()
        }
    }
}
