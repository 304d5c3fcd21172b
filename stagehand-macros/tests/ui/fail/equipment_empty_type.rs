use stagehand_macros::equipment;

#[equipment(type = "", prefix = "LGT ")]
struct Light {
    fixture_name: String,
}

fn main() {}
