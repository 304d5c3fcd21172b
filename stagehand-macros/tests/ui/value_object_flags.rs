use stagehand_macros::value_object;
use std::collections::BTreeSet;

#[value_object(copy, ordered)]
struct Slot(u32);

#[value_object]
struct Label {
    text: String,
}

#[value_object]
enum Lane {
    #[default]
    Left,
    Right,
}

fn main() {
    let a = Slot(1);
    let b = a; // Copy
    assert!(a < Slot(2));
    assert_eq!(a, b);

    let set: BTreeSet<Slot> = [Slot(3), Slot(1)].into_iter().collect();
    assert_eq!(set.into_iter().next(), Some(Slot(1)));

    let _ = format!("{:?}", Label::default());
    let _lane: Lane = Default::default();
    let _ = Lane::Right.clone();
}
