//! Entity update pipeline: inbound JSON payload → northbound attribute
//! writes, and northbound commands → outbound `set` JSON. Grounded
//! on the per-field `match` style of `tedge_mapper`'s `c8y::converter`
//! (`core::converter::Converter`'s `try_convert`/`convert` split): one pure
//! function walks the payload fields in order and returns the writes to
//! apply, a second pure function encodes a command into its wire JSON.

use crate::model::DeviceTypeCode;
use crate::northbound::{AirQualityLevel, Attribute, ColorMode, LockState, SwitchAction};
use serde_json::{json, Value};

/// One attribute write targeted at the bridged endpoints of a particular
/// device type; the caller (the controller) resolves `device_types` against
/// the entity's `bridged_endpoints` to find the concrete `EndpointId`(s).
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeWrite {
    pub device_types: Vec<DeviceTypeCode>,
    pub attribute: Attribute,
}

fn write(device_types: &[DeviceTypeCode], attribute: Attribute) -> AttributeWrite {
    AttributeWrite {
        device_types: device_types.to_vec(),
        attribute,
    }
}

/// Walk a single `MESSAGE-<entity>` JSON payload and return the attribute
/// writes it implies, preserving the payload's own key order. Idempotent:
/// calling this twice with the same payload yields the same writes both
/// times, so replaying the last payload is always safe.
pub fn apply_inbound(payload: &Value) -> Vec<AttributeWrite> {
    let Value::Object(fields) = payload else {
        return Vec::new();
    };

    let color_mode = fields.get("color_mode").and_then(Value::as_str);
    let mut writes = Vec::new();

    for (key, value) in fields {
        match key.as_str() {
            "state" => {
                if let Some(state) = value.as_str() {
                    if let Some(on) = match state {
                        "ON" => Some(true),
                        "OFF" => Some(false),
                        "TOGGLE" => None,
                        _ => continue,
                    } {
                        writes.push(write(&LIGHT_AND_SWITCH_TYPES, Attribute::OnOff(on)));
                    }
                }
            }
            "brightness" => {
                if let Some(level) = value.as_u64() {
                    writes.push(write(
                        &DIMMABLE_TYPES,
                        Attribute::CurrentLevel(level.min(254) as u8),
                    ));
                }
            }
            "color_temp" if color_mode == Some("color_temp") => {
                if let Some(mireds) = value.as_u64() {
                    writes.push(write(
                        &[DeviceTypeCode::ColorTemperatureLight, DeviceTypeCode::ColorLight],
                        Attribute::ColorTemperatureMireds(mireds as u16),
                    ));
                    writes.push(write(
                        &[DeviceTypeCode::ColorTemperatureLight, DeviceTypeCode::ColorLight],
                        Attribute::ColorMode(ColorMode::ColorTemperatureMireds),
                    ));
                }
            }
            "color" if color_mode == Some("xy") => {
                if let (Some(x), Some(y)) = (
                    value.get("x").and_then(Value::as_f64),
                    value.get("y").and_then(Value::as_f64),
                ) {
                    let (hue, saturation) = xy_to_hue_saturation(x, y);
                    writes.push(write(&[DeviceTypeCode::ColorLight], Attribute::CurrentHue(hue)));
                    writes.push(write(
                        &[DeviceTypeCode::ColorLight],
                        Attribute::CurrentSaturation(saturation),
                    ));
                    writes.push(write(
                        &[DeviceTypeCode::ColorLight],
                        Attribute::ColorMode(ColorMode::CurrentHueAndCurrentSaturation),
                    ));
                }
            }
            "temperature" => {
                if let Some(v) = value.as_f64() {
                    writes.push(write(
                        &[DeviceTypeCode::TemperatureSensor],
                        Attribute::TemperatureCentiCelsius((v * 100.0).round() as i32),
                    ));
                }
            }
            "humidity" => {
                if let Some(v) = value.as_f64() {
                    writes.push(write(
                        &[DeviceTypeCode::HumiditySensor],
                        Attribute::HumidityCentiPercent((v * 100.0).round() as i32),
                    ));
                }
            }
            "pressure" => {
                if let Some(v) = value.as_f64() {
                    writes.push(write(
                        &[DeviceTypeCode::PressureSensor],
                        Attribute::PressurePascal(v.round() as i32),
                    ));
                }
            }
            "illuminance_lux" | "illuminance" => {
                if let Some(v) = value.as_f64() {
                    writes.push(write(
                        &[DeviceTypeCode::IlluminanceSensor],
                        Attribute::IlluminanceMeasuredValue(illuminance_measured_value(v)),
                    ));
                }
            }
            "contact" => {
                if let Some(v) = value.as_bool() {
                    writes.push(write(&[DeviceTypeCode::ContactSensor], Attribute::BooleanState(v)));
                }
            }
            "water_leak" => {
                if let Some(v) = value.as_bool() {
                    writes.push(write(&[DeviceTypeCode::WaterLeakSensor], Attribute::BooleanState(v)));
                }
            }
            "smoke" => {
                if let Some(v) = value.as_bool() {
                    writes.push(write(&[DeviceTypeCode::SmokeSensor], Attribute::BooleanState(v)));
                }
            }
            "carbon_monoxide" => {
                if let Some(v) = value.as_bool() {
                    writes.push(write(
                        &[DeviceTypeCode::CarbonMonoxideSensor],
                        Attribute::BooleanState(v),
                    ));
                }
            }
            "occupancy" => {
                if let Some(v) = value.as_bool() {
                    writes.push(write(&[DeviceTypeCode::OccupancySensor], Attribute::Occupied(v)));
                }
            }
            "air_quality" => {
                if let Some(level) = value.as_str() {
                    writes.push(write(
                        &[DeviceTypeCode::AirQualitySensor],
                        Attribute::AirQuality(map_air_quality(level)),
                    ));
                }
            }
            "action" => {
                if let Some(action) = value.as_str() {
                    if let Some(action) = map_switch_action(action) {
                        writes.push(write(
                            &[DeviceTypeCode::GenericSwitch],
                            Attribute::SwitchAction(action),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    writes
}

const LIGHT_AND_SWITCH_TYPES: [DeviceTypeCode; 5] = [
    DeviceTypeCode::OnOffLight,
    DeviceTypeCode::DimmableLight,
    DeviceTypeCode::ColorTemperatureLight,
    DeviceTypeCode::ColorLight,
    DeviceTypeCode::Switch,
];

const DIMMABLE_TYPES: [DeviceTypeCode; 3] = [
    DeviceTypeCode::DimmableLight,
    DeviceTypeCode::ColorTemperatureLight,
    DeviceTypeCode::ColorLight,
];

fn map_air_quality(level: &str) -> AirQualityLevel {
    match level {
        "excellent" | "good" => AirQualityLevel::Good,
        "moderate" | "fair" => AirQualityLevel::Moderate,
        "poor" | "unhealthy" => AirQualityLevel::Unhealthy,
        "hazardous" => AirQualityLevel::Hazardous,
        _ => AirQualityLevel::Unknown,
    }
}

fn map_switch_action(action: &str) -> Option<SwitchAction> {
    match action {
        "single" | "press" | "on" | "off" | "toggle" => Some(SwitchAction::Press),
        "release" => Some(SwitchAction::Release),
        "hold" | "long_press" => Some(SwitchAction::LongPress),
        _ if action.starts_with("double") => Some(SwitchAction::MultiPress(2)),
        _ if action.starts_with("triple") => Some(SwitchAction::MultiPress(3)),
        _ => None,
    }
}

/// ZCL illuminance measured-value encoding: `clamp(round(10000*log10(v)+1), 0, 0xFFFE)`.
/// Non-positive lux readings have no defined logarithm and report 0.
fn illuminance_measured_value(lux: f64) -> u32 {
    if lux <= 0.0 {
        return 0;
    }
    let raw = (10000.0 * lux.log10() + 1.0).round();
    raw.clamp(0.0, 0xFFFE as f64) as u32
}

/// Convert CIE 1931 `xy` chromaticity (with Y normalized to 1) to hue and
/// saturation scaled to the Zigbee 0..254 range, via an intermediate
/// sRGB → HSL step.
fn xy_to_hue_saturation(x: f64, y: f64) -> (u8, u8) {
    let (r, g, b) = xy_to_srgb(x, y);
    let (h, s, _l) = rgb_to_hsl(r, g, b);
    (
        ((h / 360.0) * 254.0).round().clamp(0.0, 254.0) as u8,
        (s * 254.0).round().clamp(0.0, 254.0) as u8,
    )
}

fn xy_to_srgb(x: f64, y: f64) -> (f64, f64, f64) {
    let y_lum = 1.0;
    let y = y.max(1e-6);
    let big_x = (y_lum / y) * x;
    let big_z = (y_lum / y) * (1.0 - x - y);

    let r = big_x * 3.2406 - y_lum * 1.5372 - big_z * 0.4986;
    let g = -big_x * 0.9689 + y_lum * 1.8758 + big_z * 0.0415;
    let b = big_x * 0.0557 - y_lum * 0.2040 + big_z * 1.0570;

    (gamma_correct(r), gamma_correct(g), gamma_correct(b))
}

fn gamma_correct(channel: f64) -> f64 {
    let c = channel.clamp(0.0, 1.0);
    if c <= 0.0031308 {
        (c * 12.92).clamp(0.0, 1.0)
    } else {
        (1.055 * c.powf(1.0 / 2.4) - 0.055).clamp(0.0, 1.0)
    }
}

fn rgb_to_hsl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let delta = max - min;
    let s = if l > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };
    let mut h = if max == r {
        (g - b) / delta + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    h *= 60.0;
    if h < 0.0 {
        h += 360.0;
    }
    (h, s, l)
}

/// Inverse of `xy_to_hue_saturation`, used for outbound `moveTo{Hue,Saturation,HueAndSaturation}`
/// commands: hue/saturation (0..254) plus a luminance fixed at 50 → `{r,g,b}`.
fn hue_saturation_to_rgb(hue_254: u8, saturation_254: u8) -> (u8, u8, u8) {
    let h = hue_254 as f64 / 254.0 * 360.0;
    let s = saturation_254 as f64 / 254.0;
    let l = 0.5;

    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let h_norm = h / 360.0;

    let r = hue_to_channel(p, q, h_norm + 1.0 / 3.0);
    let g = hue_to_channel(p, q, h_norm);
    let b = hue_to_channel(p, q, h_norm - 1.0 / 3.0);

    (
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    )
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let mut t = t;
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// A northbound command bound for a single entity, encoded to the JSON body
/// published to `<prefix>/<friendly_name>/set`.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    On,
    Off,
    Toggle,
    MoveToLevel { level: u8, with_on_off: bool },
    MoveToColorTemperature { mireds: u16 },
    MoveToHue { hue: u8 },
    MoveToSaturation { saturation: u8 },
    MoveToHueAndSaturation { hue: u8, saturation: u8 },
    UpOrOpen,
    DownOrClose,
    StopMotion,
    GoToLiftPercentage { percentage: u8 },
    LockDoor,
    UnlockDoor,
    SetpointRaiseLower { delta_centi_celsius: i32 },
}

/// The outcome of encoding a command: either a `set` payload for the
/// entity's own topic, or a bridge-level request (permit_join).
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedCommand {
    EntitySet(Value),
    BridgeRequest { suffix: &'static str, payload: Value },
}

pub fn encode_outbound(command: &Command) -> EncodedCommand {
    use Command::*;
    match command {
        On => EncodedCommand::EntitySet(json!({"state": "ON"})),
        Off => EncodedCommand::EntitySet(json!({"state": "OFF"})),
        Toggle => EncodedCommand::EntitySet(json!({"state": "TOGGLE"})),
        MoveToLevel { level, with_on_off } => {
            let mut body = json!({"brightness": level});
            if *with_on_off {
                body["state"] = json!(if *level > 0 { "ON" } else { "OFF" });
            }
            EncodedCommand::EntitySet(body)
        }
        MoveToColorTemperature { mireds } => EncodedCommand::EntitySet(json!({"color_temp": mireds})),
        MoveToHue { hue } => {
            let (r, g, b) = hue_saturation_to_rgb(*hue, 254);
            EncodedCommand::EntitySet(json!({"color": {"r": r, "g": g, "b": b}}))
        }
        MoveToSaturation { saturation } => {
            let (r, g, b) = hue_saturation_to_rgb(0, *saturation);
            EncodedCommand::EntitySet(json!({"color": {"r": r, "g": g, "b": b}}))
        }
        MoveToHueAndSaturation { hue, saturation } => {
            let (r, g, b) = hue_saturation_to_rgb(*hue, *saturation);
            EncodedCommand::EntitySet(json!({"color": {"r": r, "g": g, "b": b}}))
        }
        UpOrOpen => EncodedCommand::EntitySet(json!({"state": "OPEN"})),
        DownOrClose => EncodedCommand::EntitySet(json!({"state": "CLOSE"})),
        StopMotion => EncodedCommand::EntitySet(json!({"state": "STOP"})),
        GoToLiftPercentage { percentage } => {
            EncodedCommand::EntitySet(json!({"position": percentage}))
        }
        LockDoor => EncodedCommand::BridgeRequest {
            suffix: "bridge/request/permit_join",
            payload: json!({"value": false}),
        },
        UnlockDoor => EncodedCommand::BridgeRequest {
            suffix: "bridge/request/permit_join",
            payload: json!({"value": true}),
        },
        SetpointRaiseLower { delta_centi_celsius } => {
            EncodedCommand::EntitySet(json!({"current_heating_setpoint": delta_centi_celsius}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn on_off_state_maps_to_on_off_attribute() {
        let writes = apply_inbound(&json!({"state": "ON"}));
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].attribute, Attribute::OnOff(true));
    }

    #[test]
    fn replaying_the_same_payload_is_idempotent() {
        let payload = json!({"state": "OFF", "brightness": 120});
        let first = apply_inbound(&payload);
        let second = apply_inbound(&payload);
        assert_eq!(first, second);
    }

    #[test]
    fn color_temp_requires_matching_color_mode() {
        let with_mode = apply_inbound(&json!({"color_temp": 300, "color_mode": "color_temp"}));
        assert_eq!(with_mode.len(), 2);
        let without_mode = apply_inbound(&json!({"color_temp": 300}));
        assert!(without_mode.is_empty());
    }

    #[test_case("temperature", 21.45, Attribute::TemperatureCentiCelsius(2145); "temperature scaled by 100")]
    #[test_case("humidity", 55.5, Attribute::HumidityCentiPercent(5550); "humidity scaled by 100")]
    #[test_case("pressure", 1013.25, Attribute::PressurePascal(1013); "pressure rounded, unscaled")]
    fn scalar_sensor_field_maps_to_scaled_attribute(field: &str, value: f64, expected: Attribute) {
        let writes = apply_inbound(&json!({ field: value }));
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].attribute, expected);
    }

    #[test]
    fn illuminance_uses_log_transform_and_clamps() {
        assert_eq!(illuminance_measured_value(0.0), 0);
        assert_eq!(illuminance_measured_value(1.0), 1);
        assert_eq!(illuminance_measured_value(1_000_000_000.0), 0xFFFE);
    }

    #[test]
    fn move_to_level_command_encodes_brightness() {
        let encoded = encode_outbound(&Command::MoveToLevel { level: 123, with_on_off: false });
        assert_eq!(encoded, EncodedCommand::EntitySet(json!({"brightness": 123})));
    }

    #[test]
    fn lock_door_translates_to_permit_join_false() {
        let encoded = encode_outbound(&Command::LockDoor);
        assert_eq!(
            encoded,
            EncodedCommand::BridgeRequest {
                suffix: "bridge/request/permit_join",
                payload: json!({"value": false})
            }
        );
    }

    #[test]
    fn red_hue_round_trips_through_hsl_within_tolerance() {
        let (r, g, b) = hue_saturation_to_rgb(0, 254);
        assert!(r > g && r > b);
    }
}
