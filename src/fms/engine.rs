use super::{ApproachDetails, DirectToState, FmsError, DIRECT_TO_LEG_OFFSET};
use crate::aircraft::AircraftState;
use crate::event_bus::{EventBus, FmsEvent};
use crate::facility::{
    AirportFacility, Facility, FacilityFrequency, FacilityLoader, OneWayRunway,
};
use crate::flight_plan::{
    CalculateRequest, DirectToTarget, FixTypeFlags, FlightPathCalculator, FlightPlan,
    FlightPlanLeg, FlightPlanSegment, LegDefinition, LegFlags, LegType, PlanEffect, PlanRegistry,
    SegmentType, DTO_RANDOM_PLAN, PLAN_SLOTS, PRIMARY_PLAN, PROC_PREVIEW_PLAN,
};
use crate::geo::GeoPoint;
use crate::{error, nav, warn};
use chrono::{DateTime, TimeDelta, Utc};
use fixed::types::I32F32;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Altitude pad above the field or threshold on origin, destination and
/// runway legs, metres.
pub(super) const RUNWAY_LEG_ALTITUDE_PAD_M: f64 = 15.0;

/// Ground speed below which time estimates are withheld, knots.
const MIN_ESTIMATE_GROUND_SPEED_KT: f64 = 30.0;

const KNOT_TO_MPS: f64 = 1852.0 / 3600.0;

/// Retune intents are suppressed when the frequency moved less than one
/// channel-spacing rounding error.
const FREQUENCY_EPSILON_MHZ: I32F32 = I32F32::lit("0.001");

/// The flight management engine. Every plan mutation funnels through the
/// primitives in this module; the mutation's journal is drained once per
/// operation and published on the bus, followed by one geometry recompute.
pub struct Fms {
    pub(super) registry: Arc<RwLock<PlanRegistry>>,
    pub(super) loader: Arc<dyn FacilityLoader>,
    pub(super) calculator: Arc<dyn FlightPathCalculator>,
    pub(super) bus: Arc<EventBus>,
    pub(super) plane: Arc<RwLock<AircraftState>>,
    /// Monotonic operation token. Procedure loads bump it so results of
    /// superseded async work can be recognized and dropped.
    op_token: AtomicU64,
    /// Active plan index last announced on the bus.
    published_active: AtomicUsize,
    pub(super) approach_details: RwLock<ApproachDetails>,
    /// Frequency last pushed towards the nav radios for the loaded approach.
    pub(super) approach_frequency: RwLock<Option<FacilityFrequency>>,
}

impl Fms {
    pub fn new(
        registry: Arc<RwLock<PlanRegistry>>,
        loader: Arc<dyn FacilityLoader>,
        calculator: Arc<dyn FlightPathCalculator>,
        bus: Arc<EventBus>,
        plane: Arc<RwLock<AircraftState>>,
    ) -> Self {
        Self {
            registry,
            loader,
            calculator,
            bus,
            plane,
            op_token: AtomicU64::new(0),
            published_active: AtomicUsize::new(PRIMARY_PLAN),
            approach_details: RwLock::new(ApproachDetails::default()),
            approach_frequency: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> Arc<RwLock<PlanRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Creates the plan slots and the empty primary plan skeleton.
    pub async fn initialize(&self) {
        {
            let mut registry = self.registry.write().await;
            for plan_index in [PRIMARY_PLAN, DTO_RANDOM_PLAN, PROC_PREVIEW_PLAN] {
                registry.create_plan(plan_index);
            }
        }
        for plan_index in [PRIMARY_PLAN, DTO_RANDOM_PLAN, PROC_PREVIEW_PLAN] {
            self.bus.publish(FmsEvent::PlanCreated { plan_index });
        }
        self.empty_primary_flight_plan().await;
    }

    /// Resets the primary plan to the empty segment skeleton. An active
    /// direct-to-existing is first rescued into the random slot so guidance
    /// survives the wipe while airborne.
    pub async fn empty_primary_flight_plan(&self) {
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            if !plane.on_ground
                && super::direct_to::state_of(&registry) == DirectToState::ToExisting
            {
                if let Some((ident, pos, course)) =
                    super::direct_to::existing_target_fix(&registry)
                {
                    super::direct_to::create_direct_to_random_core(
                        &mut registry,
                        &plane,
                        &ident,
                        pos,
                        course,
                    );
                }
            }
            registry.delete_plan(PRIMARY_PLAN);
            let plan = registry.create_plan(PRIMARY_PLAN);
            plan.add_segment(SegmentType::Departure, None);
            plan.add_segment(SegmentType::Enroute, None);
            plan.add_segment(SegmentType::Destination, None);
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        self.set_approach_data(ApproachDetails::default()).await;
        *self.approach_frequency.write().await = None;
        nav!("Primary flight plan reset");
    }

    /// Read access to one plan slot.
    pub async fn with_plan<R>(
        &self,
        plan_index: usize,
        read: impl FnOnce(&FlightPlan) -> R,
    ) -> Result<R, FmsError> {
        let registry = self.registry.read().await;
        registry.plan(plan_index).map(read).ok_or(FmsError::InvalidReference)
    }

    pub async fn set_active_plan(&self, plan_index: usize) -> Result<(), FmsError> {
        {
            let mut registry = self.registry.write().await;
            if !registry.set_active_index(plan_index) {
                return Err(FmsError::InvalidReference);
            }
        }
        self.sync_active_plan().await;
        Ok(())
    }

    /// Announces the guidance plan when a mutation moved it, as direct-to
    /// rescues and cancellations do.
    pub(super) async fn sync_active_plan(&self) {
        let active = self.registry.read().await.active_index();
        if self.published_active.swap(active, Ordering::SeqCst) != active {
            self.bus.publish(FmsEvent::ActivePlanChanged { plan_index: active });
        }
    }

    /// Token for guarding async work against later mutations.
    pub(super) fn current_op(&self) -> u64 {
        self.op_token.load(Ordering::SeqCst)
    }

    /// Starts a superseding operation. Anything still in flight under an
    /// older token must discard its result.
    pub(super) fn begin_op(&self) -> u64 {
        self.op_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(super) fn publish_effects(&self, drained: Vec<(usize, PlanEffect)>) {
        for (plan_index, effect) in drained {
            self.bus.publish(FmsEvent::Plan { plan_index, effect });
        }
    }

    /// Runs the geometry oracle over a plan, restarting one leg before
    /// `from` (or earlier when older legs are marked stale), and writes the
    /// results back unless a newer operation superseded `token` meanwhile.
    pub(super) async fn recompute(
        &self,
        plan_index: usize,
        from: usize,
        token: u64,
    ) -> Result<(), FmsError> {
        let (snapshots, from_index) = {
            let registry = self.registry.read().await;
            let Some(plan) = registry.plan(plan_index) else {
                return Err(FmsError::InvalidReference);
            };
            if plan.leg_count() == 0 {
                return Ok(());
            }
            let start = from
                .saturating_sub(1)
                .min(plan.first_dirty().unwrap_or(usize::MAX))
                .min(plan.leg_count() - 1);
            (plan.snapshots(), start)
        };
        let plane = *self.plane.read().await;
        let expected = snapshots.len();
        let request = CalculateRequest {
            snapshots,
            from_index,
            position: plane.pos,
            magvar: plane.magvar,
        };
        let results = self
            .calculator
            .calculate(request)
            .await
            .map_err(FmsError::CalculationFailure)?;
        if self.current_op() != token {
            return Err(FmsError::StaleAsyncResult);
        }
        let drained = {
            let mut registry = self.registry.write().await;
            let Some(plan) = registry.plan_mut(plan_index) else {
                return Err(FmsError::InvalidReference);
            };
            if plan.leg_count() != expected {
                // the plan changed shape while the oracle ran
                return Err(FmsError::StaleAsyncResult);
            }
            plan.apply_calculations(from_index, results);
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        Ok(())
    }

    /// Recomputes from just before the active leg, the window every plain
    /// plan edit invalidates.
    pub(super) async fn recompute_active_window(
        &self,
        plan_index: usize,
        token: u64,
    ) -> Result<(), FmsError> {
        let from = {
            let registry = self.registry.read().await;
            registry.plan(plan_index).map_or(0, FlightPlan::active_lateral_leg)
        };
        self.recompute(plan_index, from, token).await
    }

    /// Sets the origin airport and optional takeoff runway, dropping any
    /// loaded departure procedure.
    pub async fn set_origin(
        &self,
        airport: &AirportFacility,
        runway: Option<&str>,
    ) -> Result<(), FmsError> {
        if runway.is_some_and(|designation| airport.runway(designation).is_none()) {
            return Err(FmsError::InvalidReference);
        }
        let token = self.current_op();
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            ensure_only_one_segment_of_type(
                &mut registry,
                PRIMARY_PLAN,
                SegmentType::Departure,
                &plane,
            );
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.set_origin_airport(Some(airport.icao.clone()));
            plan.update_procedure_details(|details| {
                details.origin_runway = runway.map(str::to_string);
                details.departure_index = None;
                details.departure_runway_transition_index = None;
                details.departure_transition_index = None;
            });
            plan_add_origin_destination_leg(plan, true, airport, runway);
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        nav!("Origin set to {}", airport.icao);
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    pub async fn remove_origin(&self) -> Result<(), FmsError> {
        let token = self.current_op();
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            ensure_only_one_segment_of_type(
                &mut registry,
                PRIMARY_PLAN,
                SegmentType::Departure,
                &plane,
            );
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.set_origin_airport(None);
            plan.update_procedure_details(|details| {
                details.origin_runway = None;
                details.departure_index = None;
                details.departure_runway_transition_index = None;
                details.departure_transition_index = None;
            });
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        nav!("Origin removed");
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Sets the destination airport and optional landing runway. Keeps a
    /// loaded arrival, drops duplicated destination fixes from the enroute
    /// portion.
    pub async fn set_destination(
        &self,
        airport: &AirportFacility,
        runway: Option<&str>,
    ) -> Result<(), FmsError> {
        if runway.is_some_and(|designation| airport.runway(designation).is_none()) {
            return Err(FmsError::InvalidReference);
        }
        let token = self.current_op();
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            ensure_only_one_segment_of_type(
                &mut registry,
                PRIMARY_PLAN,
                SegmentType::Destination,
                &plane,
            );
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.set_destination_airport(Some(airport.icao.clone()));
            plan.update_procedure_details(|details| {
                details.destination_runway = runway.map(str::to_string);
            });
            plan_add_origin_destination_leg(plan, false, airport, runway);
            remove_destination_fix_duplicates(&mut registry, PRIMARY_PLAN, &airport.icao, &plane);
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        nav!("Destination set to {}", airport.icao);
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Removes the destination airport together with any arrival and
    /// approach built on it.
    pub async fn remove_destination(&self) -> Result<(), FmsError> {
        let token = self.current_op();
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            remove_segments_of_type(&mut registry, PRIMARY_PLAN, SegmentType::Arrival, &plane);
            remove_segments_of_type(&mut registry, PRIMARY_PLAN, SegmentType::Approach, &plane);
            remove_segments_of_type(
                &mut registry,
                PRIMARY_PLAN,
                SegmentType::MissedApproach,
                &plane,
            );
            ensure_only_one_segment_of_type(
                &mut registry,
                PRIMARY_PLAN,
                SegmentType::Destination,
                &plane,
            );
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.set_destination_airport(None);
            plan.update_procedure_details(|details| {
                details.arrival_index = None;
                details.arrival_runway_transition_index = None;
                details.arrival_transition_index = None;
                details.approach_index = None;
                details.approach_transition_index = None;
                details.destination_runway = None;
                details.visual_runway = None;
            });
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        self.set_approach_data(ApproachDetails::default()).await;
        *self.approach_frequency.write().await = None;
        nav!("Destination removed");
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Inserts a fix into the primary plan as a track-to-fix leg, appended
    /// to the segment or at `leg_index`. Inserting into an airway segment
    /// splits it around the new fix.
    ///
    /// # Returns
    /// The flat index of the new leg, or `None` when the insert was
    /// rejected because it would duplicate a neighbouring leg.
    pub async fn insert_waypoint(
        &self,
        segment_index: usize,
        facility: &Facility,
        leg_index: Option<usize>,
    ) -> Result<Option<usize>, FmsError> {
        let token = self.current_op();
        let leg = FlightPlanLeg {
            leg_type: LegType::TF,
            fix_icao: facility.ident().to_string(),
            pos: Some(facility.pos()),
            ..Default::default()
        };
        let (inserted, drained) = {
            let mut registry = self.registry.write().await;
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            let (segment_len, is_airway) = {
                let segment = plan.segment(segment_index).ok_or(FmsError::InvalidReference)?;
                (segment.len(), segment.airway.is_some())
            };
            let at = leg_index.unwrap_or(segment_len).min(segment_len);
            let candidate = LegDefinition::new(leg.clone(), LegFlags::NONE);
            let against_prev = plan
                .prev_leg(segment_index, at)
                .is_some_and(|(_, prev)| is_duplicate_leg(prev, &candidate));
            let against_next = plan
                .leg(plan.global_index(segment_index, at))
                .is_some_and(|next| is_duplicate_leg(&candidate, next));
            if against_prev || against_next {
                (None, Vec::new())
            } else {
                let inserted = if is_airway {
                    super::airways::insert_waypoint_split(plan, segment_index, at, leg)
                } else {
                    plan_add_leg(plan, segment_index, leg, Some(at), LegFlags::NONE)
                };
                (inserted, drain_all_effects(&mut registry))
            }
        };
        self.publish_effects(drained);
        let Some(global) = inserted else {
            return Ok(None);
        };
        nav!("Waypoint {} inserted at leg {global}", facility.ident());
        self.recompute_active_window(PRIMARY_PLAN, token).await?;
        Ok(Some(global))
    }

    /// Removes the waypoint at (segment, leg) from the primary plan, along
    /// with hold legs parked on the same fix. FAF and MAP legs refuse
    /// removal.
    ///
    /// # Returns
    /// `false` when the leg was protected and nothing changed.
    pub async fn remove_waypoint(
        &self,
        segment_index: usize,
        leg_index: usize,
    ) -> Result<bool, FmsError> {
        let token = self.current_op();
        let plane = *self.plane.read().await;
        let (removed, drained) = {
            let mut registry = self.registry.write().await;
            let (fix, airway_case) = {
                let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
                let leg = plan
                    .leg_in_segment(segment_index, leg_index)
                    .ok_or(FmsError::InvalidReference)?;
                if leg
                    .leg
                    .fix_type_flags
                    .intersects(FixTypeFlags::FAF | FixTypeFlags::MAP)
                {
                    return Ok(false);
                }
                let airway_case = super::airways::classify(plan, segment_index, leg_index)
                    != super::AirwayLegType::None;
                (leg.leg.fix_icao.clone(), airway_case)
            };
            let removed = if airway_case {
                super::airways::remove_leg_airway_handler(
                    &mut registry,
                    PRIMARY_PLAN,
                    segment_index,
                    leg_index,
                    &plane,
                )
            } else {
                plan_remove_leg(&mut registry, PRIMARY_PLAN, segment_index, leg_index, &plane)
            };
            if removed && !airway_case && !fix.is_empty() {
                // holds parked on the removed fix go with it
                while registry
                    .plan(PRIMARY_PLAN)
                    .and_then(|plan| plan.leg_in_segment(segment_index, leg_index))
                    .is_some_and(|leg| {
                        leg.leg.leg_type.is_hold() && leg.leg.fix_icao == fix
                    })
                {
                    if !plan_remove_leg(
                        &mut registry,
                        PRIMARY_PLAN,
                        segment_index,
                        leg_index,
                        &plane,
                    ) {
                        break;
                    }
                }
            }
            (removed, drain_all_effects(&mut registry))
        };
        self.publish_effects(drained);
        if removed {
            self.sync_active_plan().await;
            nav!("Waypoint removed from segment {segment_index} leg {leg_index}");
            self.recompute_active_window(PRIMARY_PLAN, token).await?;
        }
        Ok(removed)
    }

    /// Inserts a hold directly after its parent leg. The hold must circle
    /// the parent leg's fix.
    pub async fn insert_hold(
        &self,
        plan_index: usize,
        segment_index: usize,
        leg_index: usize,
        hold: FlightPlanLeg,
    ) -> Result<bool, FmsError> {
        if !hold.leg_type.is_hold() {
            return Ok(false);
        }
        let token = self.current_op();
        let drained = {
            let mut registry = self.registry.write().await;
            let plan = registry.plan_mut(plan_index).ok_or(FmsError::InvalidReference)?;
            let parent = plan
                .leg_in_segment(segment_index, leg_index)
                .ok_or(FmsError::InvalidReference)?;
            if parent.leg.fix_icao != hold.fix_icao {
                return Ok(false);
            }
            plan_add_leg(plan, segment_index, hold, Some(leg_index + 1), LegFlags::NONE);
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.recompute_active_window(plan_index, token).await?;
        Ok(true)
    }

    /// Whether the leg can become the active leg directly.
    pub async fn can_activate_leg(
        &self,
        plan_index: usize,
        segment_index: usize,
        leg_index: usize,
    ) -> bool {
        let registry = self.registry.read().await;
        registry
            .plan(plan_index)
            .is_some_and(|plan| can_activate(plan, segment_index, leg_index))
    }

    /// Whether the leg is a valid direct-to target.
    pub async fn can_direct_to(
        &self,
        plan_index: usize,
        segment_index: usize,
        leg_index: usize,
    ) -> bool {
        let registry = self.registry.read().await;
        registry
            .plan(plan_index)
            .and_then(|plan| plan.leg_in_segment(segment_index, leg_index))
            .is_some_and(|leg| {
                !leg.leg.fix_icao.is_empty()
                    && matches!(
                        leg.leg.leg_type,
                        LegType::IF
                            | LegType::TF
                            | LegType::DF
                            | LegType::CF
                            | LegType::AF
                            | LegType::RF
                    )
            })
    }

    /// Makes the leg the active lateral leg and recomputes its inbound
    /// geometry. Activation at or before an active direct-to target unwinds
    /// the direct-to instead, reactivating the requested leg once the
    /// synthetic legs are gone.
    pub async fn activate_leg(
        &self,
        plan_index: usize,
        segment_index: usize,
        leg_index: usize,
        inhibit_immediate_sequence: bool,
    ) -> Result<(), FmsError> {
        let token = self.current_op();
        let drained = {
            let mut registry = self.registry.write().await;
            let plan = registry.plan_mut(plan_index).ok_or(FmsError::InvalidReference)?;
            if plan.leg_in_segment(segment_index, leg_index).is_none() {
                return Err(FmsError::InvalidReference);
            }
            let redirected = plan_index == PRIMARY_PLAN
                && plan.direct_to().is_some_and(|target| {
                    target.segment_index == segment_index
                        && leg_index <= target.segment_leg_index
                });
            let global = plan.global_index(segment_index, leg_index);
            if redirected {
                super::direct_to::remove_direct_to_existing_core(plan, Some(global));
            } else {
                plan.set_calculating_leg(global.saturating_sub(1));
                plan.set_active_lateral_leg(global);
            }
            if plan_index == PRIMARY_PLAN {
                registry.set_active_index(PRIMARY_PLAN);
            }
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        self.bus.publish(FmsEvent::SuspendSequencing(false));
        if inhibit_immediate_sequence {
            self.bus.publish(FmsEvent::InhibitNextSequence(true));
        }
        self.recompute_active_window(plan_index, token).await
    }

    /// Whether the missed approach can be engaged: an active approach with
    /// published missed legs and the FAF already sequenced.
    pub async fn can_missed_approach_activate(&self) -> bool {
        let details = *self.approach_details.read().await;
        if !details.is_active {
            return false;
        }
        let registry = self.registry.read().await;
        let Some(plan) = registry.plan(PRIMARY_PLAN) else {
            return false;
        };
        let Some(last) = plan.leg_count().checked_sub(1).and_then(|index| plan.leg(index))
        else {
            return false;
        };
        if !last.flags.contains(LegFlags::MISSED_APPROACH) {
            return false;
        }
        let active = plan.active_lateral_leg();
        let in_approach = plan
            .segment_of(active)
            .and_then(|segment_index| plan.segment(segment_index))
            .is_some_and(|segment| segment.segment_type == SegmentType::Approach);
        in_approach && faf_global_index(plan).is_some_and(|faf| active >= faf)
    }

    /// Engages the published missed approach by activating its first leg.
    pub async fn activate_missed_approach(&self) -> Result<(), FmsError> {
        if !self.can_missed_approach_activate().await {
            return Err(FmsError::InvalidReference);
        }
        let (segment_index, leg_index) = {
            let registry = self.registry.read().await;
            let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.legs()
                .find(|(_, leg)| leg.flags.contains(LegFlags::MISSED_APPROACH))
                .and_then(|(global, _)| plan.locate(global))
                .ok_or(FmsError::InvalidReference)?
        };
        nav!("Missed approach activated");
        self.activate_leg(PRIMARY_PLAN, segment_index, leg_index, false).await
    }

    /// Current approach snapshot.
    pub async fn approach_details(&self) -> ApproachDetails {
        *self.approach_details.read().await
    }

    /// Replaces the approach snapshot and broadcasts it together with the
    /// derived availability flags when anything changed.
    pub(super) async fn set_approach_data(&self, details: ApproachDetails) {
        let changed = {
            let mut current = self.approach_details.write().await;
            let changed = *current != details;
            *current = details;
            changed
        };
        if changed {
            self.bus.publish(FmsEvent::ApproachDetails(details));
            self.bus
                .publish(FmsEvent::ApproachAvailable(details.loaded && details.is_active));
            self.bus.publish(FmsEvent::GlidepathAvailable(details.glidepath_available()));
        }
    }

    /// Stores the approach frequency and publishes tune intents for both
    /// nav radios. A retune within the channel rounding error of the stored
    /// frequency is suppressed unless it also activates.
    pub(super) async fn push_approach_frequency(
        &self,
        frequency: Option<FacilityFrequency>,
        activate: bool,
    ) {
        {
            let mut stored = self.approach_frequency.write().await;
            if let (Some(old), Some(new)) = (stored.as_ref(), frequency.as_ref()) {
                if (old.mhz - new.mhz).abs() < FREQUENCY_EPSILON_MHZ && !activate {
                    return;
                }
            }
            stored.clone_from(&frequency);
        }
        if let Some(frequency) = frequency {
            for radio in [1, 2] {
                self.bus.publish(FmsEvent::TuneNavRadio {
                    radio,
                    frequency: frequency.clone(),
                    activate,
                });
            }
        }
    }

    /// Activates the loaded approach: guidance joins the first approach leg
    /// through a direct-to and the approach is marked active.
    pub async fn activate_approach(&self) -> Result<(), FmsError> {
        let segment_index = {
            let registry = self.registry.read().await;
            let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            if plan.procedure_details().approach_index.is_none()
                && plan.procedure_details().visual_runway.is_none()
            {
                return Err(FmsError::InvalidReference);
            }
            plan.segments()
                .position(|segment| segment.segment_type == SegmentType::Approach)
                .ok_or(FmsError::InvalidReference)?
        };
        self.create_direct_to_existing(segment_index, 0, None).await?;
        nav!("Approach activated");
        self.mark_approach_active().await;
        Ok(())
    }

    /// Activates vectors-to-final. An approach loaded with a transition is
    /// first reloaded in its VTF form, then the synthesized final approach
    /// course leg becomes active.
    pub async fn activate_vtf(&self) -> Result<(), FmsError> {
        let reload = {
            let registry = self.registry.read().await;
            let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            let details = plan.procedure_details();
            let approach_index = details.approach_index.ok_or(FmsError::InvalidReference)?;
            details
                .approach_transition_index
                .is_some()
                .then(|| (approach_index, plan.destination_airport().map(str::to_string)))
        };
        if let Some((approach_index, destination)) = reload {
            let ident = destination.ok_or(FmsError::InvalidReference)?;
            let facility = self.loader.get_facility(&ident).await?;
            let airport = facility.as_airport().ok_or(FmsError::InvalidReference)?;
            self.insert_approach(airport, approach_index, None, 0).await?;
        }
        let (segment_index, leg_index) = {
            let registry = self.registry.read().await;
            let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.legs()
                .find(|(_, leg)| {
                    leg.flags.contains(LegFlags::VECTORS_TO_FINAL)
                        && leg.leg.leg_type == LegType::CF
                })
                .and_then(|(global, _)| plan.locate(global))
                .ok_or(FmsError::InvalidReference)?
        };
        self.activate_leg(PRIMARY_PLAN, segment_index, leg_index, false).await?;
        nav!("Vectors-to-final activated");
        self.mark_approach_active().await;
        Ok(())
    }

    async fn mark_approach_active(&self) {
        let mut details = *self.approach_details.read().await;
        details.is_active = true;
        self.set_approach_data(details).await;
        self.bus.publish(FmsEvent::ApproachActivated);
        if details.approach_type.is_localizer_family() {
            let frequency = self.approach_frequency.read().await.clone();
            self.push_approach_frequency(frequency, true).await;
        }
    }

    /// Reverses the primary plan: origin and destination swap and the
    /// enroute fixes are rebuilt in reverse order. Procedures are dropped.
    pub async fn invert_flight_plan(&self) -> Result<(), FmsError> {
        let token = self.current_op();
        let (origin, destination, fixes) = {
            let registry = self.registry.read().await;
            let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            let mut fixes: Vec<(String, Option<GeoPoint>)> = Vec::new();
            for (segment_index, segment) in plan.segments().enumerate() {
                if segment.segment_type != SegmentType::Enroute {
                    continue;
                }
                for leg_index in 0..segment.len() {
                    let Some(leg) = plan.leg_in_segment(segment_index, leg_index) else {
                        continue;
                    };
                    if !leg.leg.leg_type.is_to_fix()
                        || leg.flags.contains(LegFlags::DIRECT_TO)
                        || leg.leg.fix_icao.is_empty()
                    {
                        continue;
                    }
                    if fixes.last().map(|(ident, _)| ident.as_str())
                        != Some(leg.leg.fix_icao.as_str())
                    {
                        fixes.push((leg.leg.fix_icao.clone(), leg.leg.pos));
                    }
                }
            }
            (
                plan.origin_airport().map(str::to_string),
                plan.destination_airport().map(str::to_string),
                fixes,
            )
        };
        // resolve both airports before touching the plan
        let new_origin = match destination {
            Some(ident) => Some(self.loader.get_facility(&ident).await?),
            None => None,
        };
        let new_destination = match origin {
            Some(ident) => Some(self.loader.get_facility(&ident).await?),
            None => None,
        };
        self.empty_primary_flight_plan().await;
        if let Some(facility) = &new_origin {
            let airport = facility.as_airport().ok_or(FmsError::InvalidReference)?;
            self.set_origin(airport, None).await?;
        }
        if let Some(facility) = &new_destination {
            let airport = facility.as_airport().ok_or(FmsError::InvalidReference)?;
            self.set_destination(airport, None).await?;
        }
        let drained = {
            let mut registry = self.registry.write().await;
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            let enroute = plan
                .segments()
                .position(|segment| segment.segment_type == SegmentType::Enroute)
                .ok_or(FmsError::InvalidReference)?;
            for (ident, pos) in fixes.iter().rev() {
                let leg = FlightPlanLeg {
                    leg_type: LegType::TF,
                    fix_icao: ident.clone(),
                    pos: *pos,
                    ..Default::default()
                };
                plan_add_leg(plan, enroute, leg, None, LegFlags::NONE);
            }
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        nav!("Flight plan inverted");
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Serializes every plan slot for cross-instrument sync.
    pub async fn export_plans(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        let registry = self.registry.read().await;
        registry.export_snapshot()
    }

    /// Replaces the local plan slots with a synced snapshot and recomputes
    /// all geometry.
    pub async fn import_plans(&self, bytes: &[u8]) -> Result<(), bincode::error::DecodeError> {
        let drained = {
            let mut registry = self.registry.write().await;
            registry.import_snapshot(bytes)?;
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        let token = self.current_op();
        for plan_index in 0..PLAN_SLOTS {
            if let Err(err) = self.recompute(plan_index, 0, token).await {
                warn!("Plan {plan_index} recompute after import failed: {err}");
            }
        }
        Ok(())
    }

    /// Time to fly the rest of the active plan at the current ground speed.
    /// Withheld below taxi speeds and while no geometry is available.
    pub async fn estimated_time_enroute(&self) -> Option<TimeDelta> {
        let plane = *self.plane.read().await;
        if plane.ground_speed_kt < MIN_ESTIMATE_GROUND_SPEED_KT {
            return None;
        }
        let remaining_m = {
            let registry = self.registry.read().await;
            remaining_plan_distance_m(registry.active_plan()?, plane.pos)?
        };
        let seconds = remaining_m / (plane.ground_speed_kt * KNOT_TO_MPS);
        if !seconds.is_finite() {
            return None;
        }
        TimeDelta::try_seconds(seconds.round() as i64)
    }

    pub async fn estimated_arrival(&self) -> Option<DateTime<Utc>> {
        let ete = self.estimated_time_enroute().await?;
        Utc::now().checked_add_signed(ete)
    }
}

/// Metres from the aircraft to the end of the last non-missed leg.
fn remaining_plan_distance_m(plan: &FlightPlan, pos: GeoPoint) -> Option<f64> {
    let active = plan.leg(plan.active_lateral_leg())?;
    let calc = active.calculated.as_ref()?;
    let to_active_end = calc.end.map(|end| pos.distance_m(&end))?;
    let total = plan
        .legs()
        .filter(|(_, leg)| !leg.flags.contains(LegFlags::MISSED_APPROACH))
        .filter_map(|(_, leg)| leg.calculated.as_ref())
        .map(|calc| calc.cumulative_distance_m)
        .last()?;
    Some(to_active_end + (total - calc.cumulative_distance_m).max(0.0))
}

/// Drains the pending effect journals of every plan slot in order.
pub(super) fn drain_all_effects(registry: &mut PlanRegistry) -> Vec<(usize, PlanEffect)> {
    let mut drained = Vec::new();
    for plan_index in 0..PLAN_SLOTS {
        if let Some(plan) = registry.plan_mut(plan_index) {
            for effect in plan.take_effects() {
                drained.push((plan_index, effect));
            }
        }
    }
    drained
}

/// Adds a leg through the engine's bookkeeping: cancels a direct-to whose
/// target moves away, inherits the missed-approach flag behind the MAP and
/// keeps the active leg pointing at the same leg.
pub(super) fn plan_add_leg(
    plan: &mut FlightPlan,
    segment_index: usize,
    leg: FlightPlanLeg,
    index: Option<usize>,
    flags: LegFlags,
) -> Option<usize> {
    let segment = plan.segment(segment_index)?;
    let segment_type = segment.segment_type;
    let at = index.unwrap_or(segment.len()).min(segment.len());
    if let Some(target) = plan.direct_to() {
        if target.segment_index == segment_index && at <= target.segment_leg_index {
            super::direct_to::remove_direct_to_existing_core(plan, None);
        }
    }
    let mut flags = flags;
    if segment_type == SegmentType::MissedApproach {
        flags.insert(LegFlags::MISSED_APPROACH);
    } else if segment_type == SegmentType::Approach {
        if let Some((_, prev)) = plan.prev_leg(segment_index, at) {
            if prev.flags.contains(LegFlags::MISSED_APPROACH) {
                flags.insert(LegFlags::MISSED_APPROACH);
            }
        }
    }
    let global = plan.add_leg(segment_index, leg, Some(at), flags)?;
    if plan.leg_count() > 1 && plan.active_lateral_leg() >= global {
        plan.set_active_lateral_leg(plan.active_lateral_leg() + 1);
    }
    Some(global)
}

/// Removes a leg through the engine's bookkeeping: direct-to pointer
/// upkeep, active-leg adjustment, duplicate resolution at the closed gap
/// and empty-segment cleanup. Synthetic direct-to legs refuse removal.
pub(super) fn plan_remove_leg(
    registry: &mut PlanRegistry,
    plan_index: usize,
    segment_index: usize,
    leg_index: usize,
    plane: &AircraftState,
) -> bool {
    let Some(plan) = registry.plan_mut(plan_index) else {
        return false;
    };
    let Some(leg) = plan.leg_in_segment(segment_index, leg_index) else {
        return false;
    };
    if leg.flags.contains(LegFlags::DIRECT_TO) {
        return false;
    }
    let removed_ident = leg.leg.fix_icao.clone();
    let removed_pos = leg.leg.pos;
    let mut convert_to_random: Option<(String, Option<GeoPoint>, Option<f64>)> = None;
    if let Some(target) = plan.direct_to() {
        if target.segment_index == segment_index {
            if leg_index < target.segment_leg_index {
                plan.set_direct_to(Some(DirectToTarget {
                    segment_index,
                    segment_leg_index: target.segment_leg_index - 1,
                }));
            } else if leg_index == target.segment_leg_index {
                // the target itself goes away, rescue guidance into the
                // random slot when it was being flown
                let dto_global =
                    plan.global_index(segment_index, leg_index) + DIRECT_TO_LEG_OFFSET;
                let was_active = plan.active_lateral_leg() == dto_global;
                let course = plan.leg(dto_global).and_then(|dto_leg| {
                    (dto_leg.leg.leg_type == LegType::CF).then_some(dto_leg.leg.course)
                });
                super::direct_to::remove_direct_to_existing_core(plan, None);
                if was_active && !plane.on_ground && !removed_ident.is_empty() {
                    convert_to_random = Some((removed_ident.clone(), removed_pos, course));
                }
            }
        }
    }
    let Some(plan) = registry.plan_mut(plan_index) else {
        return false;
    };
    let global = plan.global_index(segment_index, leg_index);
    if plan.remove_leg(segment_index, leg_index).is_none() {
        return false;
    }
    if global < plan.active_lateral_leg() {
        plan.set_active_lateral_leg(plan.active_lateral_leg() - 1);
    }
    if global > 0 {
        let duplicate = match (plan.leg(global - 1), plan.leg(global)) {
            (Some(prev), Some(next)) => is_duplicate_leg(prev, next),
            _ => false,
        };
        if duplicate {
            plan_remove_duplicate_leg(plan, global - 1, global);
        }
    }
    check_and_remove_empty_segment(plan, segment_index);
    if let Some((ident, pos, course)) = convert_to_random {
        if super::direct_to::state_of(registry) != DirectToState::ToRandom {
            super::direct_to::create_direct_to_random_core(registry, plane, &ident, pos, course);
        }
    }
    true
}

/// Inserts an empty segment, shifting the direct-to pointer's segment
/// component past the insertion point.
pub(super) fn plan_insert_segment(
    plan: &mut FlightPlan,
    segment_index: usize,
    segment_type: SegmentType,
    airway: Option<String>,
) -> usize {
    let at = plan.insert_segment(segment_index, segment_type, airway);
    if let Some(mut target) = plan.direct_to() {
        if target.segment_index >= at {
            target.segment_index += 1;
            plan.set_direct_to(Some(target));
        }
    }
    at
}

/// Removes a whole segment. When the active leg was inside it and the
/// aircraft is airborne, guidance is rescued with a direct-to-random at
/// the active fix.
pub(super) fn plan_remove_segment(
    registry: &mut PlanRegistry,
    plan_index: usize,
    segment_index: usize,
    plane: &AircraftState,
) -> bool {
    let Some(plan) = registry.plan_mut(plan_index) else {
        return false;
    };
    let Some(segment) = plan.segment(segment_index) else {
        return false;
    };
    let segment_len = segment.len();
    let offset = plan.segment_offset(segment_index);
    let active = plan.active_lateral_leg();
    let active_inside = active >= offset && active < offset + segment_len;
    let mut rescue: Option<(String, Option<GeoPoint>, Option<f64>)> = None;
    if active_inside && !plane.on_ground && plan.leg_count() > 1 {
        if let Some(leg) = plan.leg(active) {
            if !leg.leg.fix_icao.is_empty() {
                rescue = Some((leg.leg.fix_icao.clone(), leg.leg.pos, None));
            }
        }
    }
    match plan.direct_to() {
        Some(target) if target.segment_index == segment_index => plan.set_direct_to(None),
        Some(mut target) if target.segment_index > segment_index => {
            target.segment_index -= 1;
            plan.set_direct_to(Some(target));
        }
        _ => {}
    }
    plan.remove_segment(segment_index);
    let delta = active.saturating_sub(offset).min(segment_len);
    if delta > 0 {
        plan.set_active_lateral_leg(active - delta);
    }
    if let Some((ident, pos, course)) = rescue {
        if super::direct_to::state_of(registry) != DirectToState::ToRandom {
            super::direct_to::create_direct_to_random_core(registry, plane, &ident, pos, course);
        }
    }
    true
}

/// Empties a segment while keeping it in place.
pub(super) fn plan_clear_segment(
    registry: &mut PlanRegistry,
    plan_index: usize,
    segment_index: usize,
    plane: &AircraftState,
) -> bool {
    let Some(segment_type) = registry
        .plan(plan_index)
        .and_then(|plan| plan.segment(segment_index))
        .map(|segment| segment.segment_type)
    else {
        return false;
    };
    if !plan_remove_segment(registry, plan_index, segment_index, plane) {
        return false;
    }
    if let Some(plan) = registry.plan_mut(plan_index) {
        plan_insert_segment(plan, segment_index, segment_type, None);
    }
    true
}

fn after_last(plan: &FlightPlan, types: &[SegmentType]) -> Option<usize> {
    plan.segments()
        .enumerate()
        .filter(|(_, segment)| types.contains(&segment.segment_type))
        .map(|(index, _)| index + 1)
        .last()
}

/// Inserts an empty segment at the canonical position for its type:
/// departures lead, arrivals follow the enroute portion, approaches follow
/// arrivals, everything else lands before the destination.
pub(super) fn plan_insert_segment_of_type(
    plan: &mut FlightPlan,
    segment_type: SegmentType,
) -> usize {
    let position = match segment_type {
        SegmentType::Origin | SegmentType::Departure => 0,
        SegmentType::Arrival => after_last(plan, &[SegmentType::Enroute]).unwrap_or(2),
        SegmentType::Approach => {
            after_last(plan, &[SegmentType::Enroute, SegmentType::Arrival]).unwrap_or(2)
        }
        SegmentType::MissedApproach => {
            after_last(plan, &[SegmentType::Approach]).unwrap_or(plan.segment_count())
        }
        SegmentType::Destination => after_last(
            plan,
            &[SegmentType::Enroute, SegmentType::Arrival, SegmentType::Approach],
        )
        .unwrap_or(plan.segment_count()),
        SegmentType::Enroute | SegmentType::RandomDirectTo => plan
            .segments()
            .position(|segment| segment.segment_type == SegmentType::Destination)
            .unwrap_or(plan.segment_count()),
    };
    plan_insert_segment(plan, position.min(plan.segment_count()), segment_type, None)
}

/// Makes sure exactly one empty segment of the type exists and returns its
/// index.
pub(super) fn ensure_only_one_segment_of_type(
    registry: &mut PlanRegistry,
    plan_index: usize,
    segment_type: SegmentType,
    plane: &AircraftState,
) -> Option<usize> {
    loop {
        let indices: Vec<usize> = registry
            .plan(plan_index)?
            .segments()
            .enumerate()
            .filter(|(_, segment)| segment.segment_type == segment_type)
            .map(|(index, _)| index)
            .collect();
        match indices.as_slice() {
            [] => {
                let plan = registry.plan_mut(plan_index)?;
                return Some(plan_insert_segment_of_type(plan, segment_type));
            }
            [index] => {
                let index = *index;
                plan_clear_segment(registry, plan_index, index, plane);
                return Some(index);
            }
            [.., last] => {
                let last = *last;
                plan_remove_segment(registry, plan_index, last, plane);
            }
        }
    }
}

/// Removes every segment of the type, if any.
pub(super) fn remove_segments_of_type(
    registry: &mut PlanRegistry,
    plan_index: usize,
    segment_type: SegmentType,
    plane: &AircraftState,
) {
    while let Some(index) = registry.plan(plan_index).and_then(|plan| {
        plan.segments().position(|segment| segment.segment_type == segment_type)
    }) {
        if !plan_remove_segment(registry, plan_index, index, plane) {
            break;
        }
    }
}

/// Drops an emptied enroute segment when another enroute segment can take
/// its place, then merges adjacent plain enroute segments.
pub(super) fn check_and_remove_empty_segment(plan: &mut FlightPlan, segment_index: usize) {
    let Some(segment) = plan.segment(segment_index) else {
        return;
    };
    if !segment.is_empty() || segment.segment_type != SegmentType::Enroute {
        return;
    }
    let enroute_count = plan
        .segments()
        .filter(|segment| segment.segment_type == SegmentType::Enroute)
        .count();
    if enroute_count <= 1 {
        return;
    }
    if let Some(mut target) = plan.direct_to() {
        if target.segment_index > segment_index {
            target.segment_index -= 1;
            plan.set_direct_to(Some(target));
        }
    }
    plan.remove_segment(segment_index);
    merge_adjacent_enroute_segments(plan, segment_index.saturating_sub(1));
}

/// Merges the enroute segment at `first` with its successor when both are
/// plain enroute segments.
pub(super) fn merge_adjacent_enroute_segments(plan: &mut FlightPlan, first: usize) {
    let mergeable = match (plan.segment(first), plan.segment(first + 1)) {
        (Some(a), Some(b)) => {
            a.segment_type == SegmentType::Enroute
                && b.segment_type == SegmentType::Enroute
                && a.airway.is_none()
                && b.airway.is_none()
        }
        _ => false,
    };
    if mergeable {
        plan.merge_segments(first);
    }
}

/// Two consecutive legs duplicate each other when both terminate at the
/// same published fix with fixed-terminator types.
pub(super) fn is_duplicate_leg(first: &LegDefinition, second: &LegDefinition) -> bool {
    first.leg.leg_type.is_to_fix()
        && second.leg.leg_type.is_to_fix()
        && !first.leg.fix_icao.is_empty()
        && first.leg.fix_icao == second.leg.fix_icao
}

/// Duplicate check for procedure boundaries, where the later leg is the IF
/// opening the next procedure portion.
pub(super) fn is_duplicate_if_leg(first: &FlightPlanLeg, second: &FlightPlanLeg) -> bool {
    second.leg_type == LegType::IF
        && matches!(
            first.leg_type,
            LegType::TF | LegType::DF | LegType::RF | LegType::CF | LegType::AF | LegType::IF
        )
        && !first.fix_icao.is_empty()
        && first.fix_icao == second.fix_icao
}

fn in_procedure(segment: Option<&FlightPlanSegment>) -> bool {
    segment.is_some_and(|segment| {
        matches!(
            segment.segment_type,
            SegmentType::Departure
                | SegmentType::Arrival
                | SegmentType::Approach
                | SegmentType::MissedApproach
        )
    })
}

/// Resolves a duplicate pair of legs. Keeps the procedure copy when only
/// one side belongs to a procedure, always keeps FAF/MAP-flagged legs, and
/// merges the deleted leg's fix roles and altitude restriction into the
/// survivor. A deleted direct-to target takes its synthetic legs along to
/// the survivor, preserving activation.
pub(super) fn plan_remove_duplicate_leg(
    plan: &mut FlightPlan,
    first_global: usize,
    second_global: usize,
) -> bool {
    let Some((first_seg, first_idx)) = plan.locate(first_global) else {
        return false;
    };
    let Some((second_seg, second_idx)) = plan.locate(second_global) else {
        return false;
    };
    let Some(second) = plan.leg(second_global) else {
        return false;
    };

    if second.flags.contains(LegFlags::DIRECT_TO) {
        // a duplicate against the middle of a direct-to sequence resolves
        // against the target instead
        if second.leg.leg_type == LegType::IF {
            return false;
        }
        let Some(target) = plan.direct_to() else {
            return false;
        };
        let target_global = plan.global_index(target.segment_index, target.segment_leg_index);
        return plan_remove_duplicate_leg(plan, first_global, target_global);
    }

    let first_proc = in_procedure(plan.segment(first_seg));
    let second_proc = in_procedure(plan.segment(second_seg));
    let delete_first = (!first_proc && second_proc)
        || (first_proc && second_proc && first_seg != second_seg)
        || second
            .leg
            .fix_type_flags
            .intersects(FixTypeFlags::FAF | FixTypeFlags::MAP);

    let (del_seg, del_idx, del_global) = if delete_first {
        (first_seg, first_idx, first_global)
    } else {
        (second_seg, second_idx, second_global)
    };

    if !delete_first {
        let source = second.clone();
        plan.update_leg(first_seg, first_idx, |leg| {
            leg.leg.fix_type_flags.insert(source.leg.fix_type_flags);
            leg.leg.alt_desc = source.leg.alt_desc;
            leg.leg.altitude1 = source.leg.altitude1;
            leg.leg.altitude2 = source.leg.altitude2;
            leg.vertical = source.vertical;
        });
    }

    let relocate = plan
        .direct_to()
        .is_some_and(|target| {
            (target.segment_index, target.segment_leg_index) == (del_seg, del_idx)
        });
    let was_dto_active =
        relocate && plan.active_lateral_leg() == del_global + DIRECT_TO_LEG_OFFSET;
    let mut synthetic: Vec<LegDefinition> = Vec::new();
    if relocate {
        for _ in 0..DIRECT_TO_LEG_OFFSET {
            let removal_global = del_global + 1;
            match plan.remove_leg(del_seg, del_idx + 1) {
                Some(leg) => {
                    synthetic.push(leg);
                    if removal_global < plan.active_lateral_leg() {
                        plan.set_active_lateral_leg(plan.active_lateral_leg() - 1);
                    }
                }
                None => break,
            }
        }
        if synthetic.len() < DIRECT_TO_LEG_OFFSET {
            error!("Direct-to sequence truncated at its target, dropping the direct-to");
            plan.set_direct_to(None);
            synthetic.clear();
        }
    }

    if plan.remove_leg(del_seg, del_idx).is_none() {
        return false;
    }
    if del_global < plan.active_lateral_leg() {
        plan.set_active_lateral_leg(plan.active_lateral_leg() - 1);
    }

    if relocate && !synthetic.is_empty() {
        // the survivor sits before the deleted target, its position is
        // unchanged by the removals
        if let Some((keep_seg, keep_idx)) = plan.locate(first_global) {
            plan.set_direct_to(Some(DirectToTarget {
                segment_index: keep_seg,
                segment_leg_index: keep_idx,
            }));
            for (offset, leg) in synthetic.into_iter().enumerate() {
                plan.add_leg(keep_seg, leg.leg, Some(keep_idx + 1 + offset), leg.flags);
            }
            if was_dto_active {
                plan.set_active_lateral_leg(
                    plan.global_index(keep_seg, keep_idx) + DIRECT_TO_LEG_OFFSET,
                );
            }
        }
    }
    check_and_remove_empty_segment(plan, del_seg);
    true
}

/// Builds and inserts the origin or destination reference leg: the runway
/// threshold when a runway is selected, else the airport itself.
pub(super) fn plan_add_origin_destination_leg(
    plan: &mut FlightPlan,
    is_origin: bool,
    airport: &AirportFacility,
    runway: Option<&str>,
) -> Option<usize> {
    let leg_type = if is_origin { LegType::IF } else { LegType::TF };
    let leg = runway
        .and_then(|designation| airport.runway(designation))
        .map_or_else(
            || airport_reference_leg(airport, leg_type),
            |runway| runway_leg(airport, runway, leg_type),
        );
    if is_origin {
        plan_add_leg(plan, 0, leg, Some(0), LegFlags::NONE)
    } else {
        let destination = plan
            .segments()
            .position(|segment| segment.segment_type == SegmentType::Destination)?;
        plan_add_leg(plan, destination, leg, None, LegFlags::NONE)
    }
}

/// Leg to a runway threshold, ident in the `KBOS-RW04R` style.
pub(super) fn runway_leg(
    airport: &AirportFacility,
    runway: &OneWayRunway,
    leg_type: LegType,
) -> FlightPlanLeg {
    FlightPlanLeg {
        leg_type,
        fix_icao: format!("{}-RW{}", airport.icao, runway.designation),
        pos: Some(runway.pos),
        altitude1: runway.elevation_m + RUNWAY_LEG_ALTITUDE_PAD_M,
        ..Default::default()
    }
}

pub(super) fn airport_reference_leg(airport: &AirportFacility, leg_type: LegType) -> FlightPlanLeg {
    FlightPlanLeg {
        leg_type,
        fix_icao: airport.icao.clone(),
        pos: Some(airport.pos),
        altitude1: airport.elevation_m() + RUNWAY_LEG_ALTITUDE_PAD_M,
        ..Default::default()
    }
}

/// Drops legs in the last enroute segment that duplicate the destination
/// fix just added to the destination segment.
pub(super) fn remove_destination_fix_duplicates(
    registry: &mut PlanRegistry,
    plan_index: usize,
    icao: &str,
    plane: &AircraftState,
) {
    let Some(enroute) = registry.plan(plan_index).and_then(|plan| {
        plan.segments()
            .enumerate()
            .filter(|(_, segment)| segment.segment_type == SegmentType::Enroute)
            .map(|(index, _)| index)
            .last()
    }) else {
        return;
    };
    loop {
        let hit = registry.plan(plan_index).and_then(|plan| {
            let segment = plan.segment(enroute)?;
            (0..segment.len()).rev().find(|&leg_index| {
                plan.leg_in_segment(enroute, leg_index)
                    .is_some_and(|leg| leg.leg.fix_icao == icao)
            })
        });
        match hit {
            Some(leg_index) => {
                if !plan_remove_leg(registry, plan_index, enroute, leg_index, plane) {
                    break;
                }
            }
            None => break,
        }
    }
}

/// Activation guard: course-from-fix legs always activate, open-ended
/// heading and altitude legs never do, and a leg behind an unresumable
/// predecessor cannot be joined.
pub(super) fn can_activate(plan: &FlightPlan, segment_index: usize, leg_index: usize) -> bool {
    let Some(leg) = plan.leg_in_segment(segment_index, leg_index) else {
        return false;
    };
    if leg.flags.contains(LegFlags::DIRECT_TO) {
        return false;
    }
    match leg.leg.leg_type {
        LegType::CF | LegType::FC | LegType::FD => return true,
        LegType::CI
        | LegType::VI
        | LegType::FA
        | LegType::CA
        | LegType::VA
        | LegType::VM => return false,
        _ => {}
    }
    match plan.prev_leg(segment_index, leg_index) {
        None => false,
        Some((_, prev)) => {
            !matches!(prev.leg.leg_type, LegType::VA | LegType::CA | LegType::VM)
                && !prev.leg.leg_type.is_discontinuity()
        }
    }
}

/// Flat index of the final approach fix: the FAF-flagged leg of the
/// approach segment, defaulting to the penultimate non-missed leg.
pub(super) fn faf_global_index(plan: &FlightPlan) -> Option<usize> {
    let approach = plan
        .segments()
        .position(|segment| segment.segment_type == SegmentType::Approach)?;
    let offset = plan.segment_offset(approach);
    let segment_len = plan.segment(approach)?.len();
    let mut final_count = 0;
    for leg_index in 0..segment_len {
        let Some(leg) = plan.leg_in_segment(approach, leg_index) else {
            continue;
        };
        if leg.leg.fix_type_flags.contains(FixTypeFlags::FAF) {
            return Some(offset + leg_index);
        }
        if !leg.flags.contains(LegFlags::MISSED_APPROACH) {
            final_count = leg_index + 1;
        }
    }
    (final_count >= 2).then(|| offset + final_count - 2)
}
