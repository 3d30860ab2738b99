use crate::aircraft::AircraftState;
use crate::event_bus::EventBus;
use crate::facility::FacilityLoader;
use crate::flight_plan::{DefaultFlightPathCalculator, PlanRegistry};
use crate::fms::Fms;
use crate::tracking::TrackingComputer;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Struct representing the key components of the avionics stack, providing
/// access to the shared subsystems wired over one event bus: the navdata
/// loader, the plan registry, the ownship state, the flight management
/// engine and the tracking computer.
#[derive(Clone)]
pub struct Keychain {
    /// The navdata backend resolving facilities and airways.
    loader: Arc<dyn FacilityLoader>,
    /// The broadcast bus every subsystem publishes on.
    bus: Arc<EventBus>,
    /// The registry holding all flight plan slots.
    registry: Arc<RwLock<PlanRegistry>>,
    /// The ownship state sampled by the engine and the tracking computer.
    plane: Arc<RwLock<AircraftState>>,
    /// The flight management engine, owner of every plan mutation.
    fms: Arc<Fms>,
    /// The tracking computer turning director state into CDI guidance.
    tracking: Arc<TrackingComputer>,
}

impl Keychain {
    /// Creates a new instance of `Keychain` over the given navdata backend,
    /// wiring every subsystem to one fresh bus.
    pub fn new(loader: Arc<dyn FacilityLoader>) -> Self {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(RwLock::new(PlanRegistry::new()));
        let plane = Arc::new(RwLock::new(AircraftState::default()));
        let calculator = Arc::new(DefaultFlightPathCalculator::new(Arc::clone(&loader)));
        let fms = Arc::new(Fms::new(
            Arc::clone(&registry),
            Arc::clone(&loader),
            calculator,
            Arc::clone(&bus),
            Arc::clone(&plane),
        ));
        let tracking = Arc::new(TrackingComputer::new(
            Arc::clone(&registry),
            Arc::clone(&loader),
            Arc::clone(&bus),
            Arc::clone(&plane),
        ));
        Self {
            loader,
            bus,
            registry,
            plane,
            fms,
            tracking,
        }
    }

    /// Provides a cloned reference to the navdata loader.
    pub fn loader(&self) -> Arc<dyn FacilityLoader> { Arc::clone(&self.loader) }

    /// Provides a cloned reference to the event bus.
    pub fn bus(&self) -> Arc<EventBus> { Arc::clone(&self.bus) }

    /// Provides a cloned reference to the plan registry.
    pub fn registry(&self) -> Arc<RwLock<PlanRegistry>> { Arc::clone(&self.registry) }

    /// Provides a cloned reference to the ownship state.
    pub fn plane(&self) -> Arc<RwLock<AircraftState>> { Arc::clone(&self.plane) }

    /// Provides a cloned reference to the flight management engine.
    pub fn fms(&self) -> Arc<Fms> { Arc::clone(&self.fms) }

    /// Provides a cloned reference to the tracking computer.
    pub fn tracking(&self) -> Arc<TrackingComputer> { Arc::clone(&self.tracking) }
}
