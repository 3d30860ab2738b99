use crate::event;
use crate::facility::FacilityFrequency;
use crate::flight_plan::PlanEffect;
use crate::fms::ApproachDetails;
use crate::tracking::TrackingData;
use tokio::sync::broadcast;

/// Everything the engine and the guidance computers publish. Consumers
/// subscribe through the [`EventBus`] and never call back into the engine
/// from the receiving task.
#[derive(Debug, Clone)]
pub enum FmsEvent {
    /// One journal entry out of a plan mutation batch.
    Plan { plan_index: usize, effect: PlanEffect },
    PlanCreated { plan_index: usize },
    PlanDeleted { plan_index: usize },
    ActivePlanChanged { plan_index: usize },
    ApproachDetails(ApproachDetails),
    /// An approach is both loaded and active.
    ApproachAvailable(bool),
    ApproachActivated,
    GlidepathAvailable(bool),
    ObsAvailable(bool),
    SuspendSequencing(bool),
    InhibitNextSequence(bool),
    /// Ask the radio stack to put a frequency into a nav standby slot.
    TuneNavRadio { radio: u8, frequency: FacilityFrequency, activate: bool },
    /// Preset an OBS course on a nav source after a source switch.
    SlewObs { radio: u8, course: f64 },
    Tracking(Box<TrackingData>),
}

/// Broadcast fan-out for [`FmsEvent`]s. Publishing without subscribers is
/// a no-op, lagged subscribers lose the oldest events.
pub struct EventBus {
    sender: broadcast::Sender<FmsEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { sender: broadcast::Sender::new(64) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FmsEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: FmsEvent) {
        event!("{event:?}");
        if self.sender.receiver_count() > 0 {
            let _ = self.sender.send(event);
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
