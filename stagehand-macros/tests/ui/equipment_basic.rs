use stagehand_domain::payload::Payload;
use stagehand_macros::equipment;

#[equipment(type = "light", prefix = "LGT ")]
struct Light {
    #[required]
    fixture_name: String,
    #[required]
    dmx_universe: Option<u16>,
    notes: Option<String>,
}

fn main() {
    assert_eq!(Light::TYPE, "light");
    assert_eq!(Light::DISPLAY_PREFIX, "LGT ");

    let empty = Light::default();
    assert_eq!(empty.missing_fields(), vec!["fixtureName", "dmxUniverse"]);

    let filled = Light {
        fixture_name: "Fresnel".into(),
        dmx_universe: Some(2),
        notes: None,
    };
    assert!(filled.missing_fields().is_empty());

    // camelCase 序列化
    let json = serde_json::to_value(&filled).unwrap();
    assert_eq!(json["fixtureName"], "Fresnel");
}
