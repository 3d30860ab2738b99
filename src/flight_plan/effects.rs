use strum_macros::Display;

/// How a leg or segment entry changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChangeKind {
    Added,
    Inserted,
    Removed,
    Changed,
}

/// Which active-leg pointer moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ActiveLegKind {
    Lateral,
    Calculating,
}

/// One observable consequence of a plan mutation.
///
/// Mutations append to the plan's effect journal instead of notifying
/// listeners inline, and the owner drains the journal once per batch. An
/// aborted batch drops its effects undelivered.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEffect {
    LegChanged {
        segment_index: usize,
        leg_index: usize,
        change: ChangeKind,
    },
    SegmentChanged {
        segment_index: usize,
        change: ChangeKind,
    },
    ActiveLegChanged {
        kind: ActiveLegKind,
        index: usize,
        previous: usize,
    },
    OriginChanged {
        airport: Option<String>,
    },
    DestinationChanged {
        airport: Option<String>,
    },
    ProcedureDetailsChanged,
    DirectToDataChanged,
    Calculated {
        from_index: usize,
    },
}
