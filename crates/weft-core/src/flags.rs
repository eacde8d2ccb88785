bitflags::bitflags! {
    /// Effect flags recorded on a fiber during render and consumed by commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        const PLACEMENT = 1 << 0;
        const UPDATE = 1 << 1;
        const CHILD_DELETION = 1 << 2;
        const REF = 1 << 3;
        const PASSIVE = 1 << 4;
        const VISIBILITY = 1 << 5;
        const SHOULD_CAPTURE = 1 << 6;
        const DID_CAPTURE = 1 << 7;
        const INCOMPLETE = 1 << 8;
    }
}

impl Flags {
    /// Flags that survive an unwind back to a capturing boundary.
    pub const HOST_EFFECT_MASK: Flags = Flags::PLACEMENT
        .union(Flags::UPDATE)
        .union(Flags::CHILD_DELETION)
        .union(Flags::REF)
        .union(Flags::PASSIVE)
        .union(Flags::VISIBILITY);

    pub const MUTATION_MASK: Flags = Flags::PLACEMENT
        .union(Flags::UPDATE)
        .union(Flags::CHILD_DELETION)
        .union(Flags::REF)
        .union(Flags::VISIBILITY);

    pub const LAYOUT_MASK: Flags = Flags::UPDATE.union(Flags::REF);
}

bitflags::bitflags! {
    /// Tags on a hook effect record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HookFlags: u8 {
        /// The effect's create callback must run in this commit.
        const HAS_EFFECT = 1 << 0;
        const LAYOUT = 1 << 1;
        const PASSIVE = 1 << 2;
    }
}
