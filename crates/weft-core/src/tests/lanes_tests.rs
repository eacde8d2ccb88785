use super::*;

#[test]
fn highest_priority_picks_lowest_bit() {
    let lanes = Lanes::TRANSITION | Lanes::DEFAULT | Lanes::IDLE;
    assert_eq!(lanes.highest_priority(), Lanes::DEFAULT);
    assert_eq!(Lanes::empty().highest_priority(), Lanes::empty());
    assert_eq!((Lanes::SYNC | Lanes::IDLE).highest_priority(), Lanes::SYNC);
}

#[test]
fn empty_set_is_subset_of_everything() {
    assert!(Lanes::empty().is_superset_of(Lanes::empty()));
    assert!(Lanes::DEFAULT.is_superset_of(Lanes::empty()));
    assert!(!Lanes::DEFAULT.is_superset_of(Lanes::SYNC));
    assert!((Lanes::SYNC | Lanes::DEFAULT).is_superset_of(Lanes::SYNC));
}

#[test]
fn blocking_lanes_are_sync_and_input() {
    assert!(Lanes::SYNC.includes_some(BLOCKING_LANES));
    assert!(Lanes::INPUT_CONTINUOUS.includes_some(BLOCKING_LANES));
    assert!(!Lanes::DEFAULT.includes_some(BLOCKING_LANES));
    assert!(!Lanes::TRANSITION.includes_some(BLOCKING_LANES));
}

#[test]
fn priority_mapping_follows_lane_urgency() {
    assert_eq!(Lanes::SYNC.to_priority(), Priority::Immediate);
    assert_eq!(Lanes::INPUT_CONTINUOUS.to_priority(), Priority::UserBlocking);
    assert_eq!(Lanes::DEFAULT.to_priority(), Priority::Normal);
    assert_eq!(Lanes::TRANSITION.to_priority(), Priority::Normal);
    assert_eq!(Lanes::IDLE.to_priority(), Priority::Idle);
    assert_eq!((Lanes::DEFAULT | Lanes::SYNC).to_priority(), Priority::Immediate);

    assert_eq!(Lanes::from_priority(Priority::Immediate), Lanes::SYNC);
    assert_eq!(Lanes::from_priority(Priority::Low), Lanes::DEFAULT);
    assert_eq!(Lanes::from_priority(Priority::Idle), Lanes::IDLE);
}
