use stagehand_macros::identifier;
use std::collections::HashMap;

#[identifier]
struct RackId(String);

fn main() {
    let id = RackId::new("rack-1");
    assert_eq!(id.as_str(), "rack-1");
    assert_eq!(id.to_string(), "rack-1");

    let parsed: RackId = "rack-1".parse().unwrap();
    assert_eq!(parsed, id);

    // Borrow<str>：可直接用 &str 查表
    let mut map = HashMap::new();
    map.insert(id.clone(), 1);
    assert_eq!(map.get("rack-1"), Some(&1));

    let raw: String = id.into();
    assert_eq!(raw, "rack-1");
}
