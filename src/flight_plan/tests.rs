use super::*;
use crate::geo::GeoPoint;

fn tf(ident: &str, lat: f64, lon: f64) -> FlightPlanLeg {
    FlightPlanLeg {
        leg_type: LegType::TF,
        fix_icao: ident.to_string(),
        pos: Some(GeoPoint::new(lat, lon)),
        ..Default::default()
    }
}

fn skeleton() -> FlightPlan {
    let mut plan = FlightPlan::new(PRIMARY_PLAN);
    plan.add_segment(SegmentType::Departure, None);
    plan.add_segment(SegmentType::Enroute, None);
    plan.add_segment(SegmentType::Destination, None);
    plan.take_effects();
    plan
}

#[test]
fn arena_handles_survive_unrelated_removals() {
    let mut arena = LegArena::default();
    let first = arena.insert(LegDefinition::new(tf("AAA", 0.0, 0.0), LegFlags::NONE));
    let second = arena.insert(LegDefinition::new(tf("BBB", 1.0, 0.0), LegFlags::NONE));
    let third = arena.insert(LegDefinition::new(tf("CCC", 2.0, 0.0), LegFlags::NONE));

    assert!(arena.remove(second).is_some());
    assert!(arena.get(first).is_some_and(|leg| leg.leg.fix_icao == "AAA"));
    assert!(arena.get(third).is_some_and(|leg| leg.leg.fix_icao == "CCC"));
    assert_eq!(arena.len(), 2);
}

#[test]
fn stale_arena_handles_never_alias_reused_slots() {
    let mut arena = LegArena::default();
    let doomed = arena.insert(LegDefinition::new(tf("OLD", 0.0, 0.0), LegFlags::NONE));
    arena.remove(doomed);
    // reuses the freed slot with a bumped generation
    let fresh = arena.insert(LegDefinition::new(tf("NEW", 0.0, 0.0), LegFlags::NONE));

    assert!(arena.get(doomed).is_none());
    assert!(arena.remove(doomed).is_none());
    assert!(arena.get(fresh).is_some_and(|leg| leg.leg.fix_icao == "NEW"));
}

#[test]
fn segment_offsets_reflow_with_edits() {
    let mut plan = skeleton();
    plan.add_leg(0, tf("DEP1", 0.0, 0.0), None, LegFlags::NONE);
    plan.add_leg(0, tf("DEP2", 0.0, 1.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("ENR1", 0.0, 2.0), None, LegFlags::NONE);

    assert_eq!(plan.segment_offset(0), 0);
    assert_eq!(plan.segment_offset(1), 2);
    assert_eq!(plan.segment_offset(2), 3);

    plan.remove_leg(0, 0);
    assert_eq!(plan.segment_offset(1), 1);
    assert_eq!(plan.segment_offset(2), 2);

    plan.insert_segment(1, SegmentType::Enroute, Some("J121.ENR1".to_string()));
    assert_eq!(plan.segment_count(), 4);
    assert_eq!(plan.segment_offset(2), 1);
}

#[test]
fn flat_index_locate_round_trips() {
    let mut plan = skeleton();
    plan.add_leg(0, tf("DEP1", 0.0, 0.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("ENR1", 0.0, 1.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("ENR2", 0.0, 2.0), None, LegFlags::NONE);

    for global in 0..plan.leg_count() {
        let (segment_index, leg_index) = plan.locate(global).expect("leg exists");
        assert_eq!(plan.global_index(segment_index, leg_index), global);
    }
    assert!(plan.locate(plan.leg_count()).is_none());
    assert!(plan.leg(2).is_some_and(|leg| leg.leg.fix_icao == "ENR2"));
}

#[test]
fn leg_journal_distinguishes_append_and_insert() {
    let mut plan = skeleton();
    plan.add_leg(1, tf("ENR1", 0.0, 0.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("ENR0", 0.0, 1.0), Some(0), LegFlags::NONE);
    let effects = plan.take_effects();

    assert_eq!(
        effects,
        vec![
            PlanEffect::LegChanged { segment_index: 1, leg_index: 0, change: ChangeKind::Added },
            PlanEffect::LegChanged { segment_index: 1, leg_index: 0, change: ChangeKind::Inserted },
        ]
    );
    // journal drained
    assert!(plan.take_effects().is_empty());
}

#[test]
fn removed_legs_come_back_to_the_caller() {
    let mut plan = skeleton();
    plan.add_leg(1, tf("ENR1", 0.0, 0.0), None, LegFlags::NONE);
    let removed = plan.remove_leg(1, 0);
    assert!(removed.is_some_and(|leg| leg.leg.fix_icao == "ENR1"));
    assert!(plan.remove_leg(1, 0).is_none());
    assert_eq!(plan.leg_count(), 0);
}

#[test]
fn active_leg_pointer_clamps_to_plan_length() {
    let mut plan = skeleton();
    plan.add_leg(1, tf("ENR1", 0.0, 0.0), None, LegFlags::NONE);
    plan.set_active_lateral_leg(99);
    assert_eq!(plan.active_lateral_leg(), 1);
    plan.set_calculating_leg(99);
    assert_eq!(plan.calculating_leg(), 1);
}

#[test]
fn reverse_iteration_starts_at_the_requested_leg() {
    let mut plan = skeleton();
    plan.add_leg(1, tf("ONE", 0.0, 0.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("TWO", 0.0, 1.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("THREE", 0.0, 2.0), None, LegFlags::NONE);

    let idents: Vec<String> =
        plan.legs_reverse_from(1).map(|(_, leg)| leg.leg.fix_icao.clone()).collect();
    assert_eq!(idents, vec!["TWO".to_string(), "ONE".to_string()]);
}

#[test]
fn neighbours_resolve_across_segment_boundaries() {
    let mut plan = skeleton();
    plan.add_leg(0, tf("DEP1", 0.0, 0.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("ENR1", 0.0, 1.0), None, LegFlags::NONE);

    let prev = plan.prev_leg(1, 0);
    assert!(prev.is_some_and(|(index, leg)| index == 0 && leg.leg.fix_icao == "DEP1"));
    let next = plan.next_leg(0, 0);
    assert!(next.is_some_and(|(index, leg)| index == 1 && leg.leg.fix_icao == "ENR1"));
    assert!(plan.prev_leg(0, 0).is_none());
    assert!(plan.next_leg(1, 0).is_none());
}

#[test]
fn edits_mark_the_tail_dirty_and_calculations_clear_it() {
    let mut plan = skeleton();
    plan.add_leg(1, tf("ONE", 0.0, 0.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("TWO", 0.0, 1.0), None, LegFlags::NONE);
    plan.add_leg(1, tf("THREE", 0.0, 2.0), None, LegFlags::NONE);
    assert_eq!(plan.first_dirty(), Some(0));

    let results = vec![LegCalculations::default(); 3];
    plan.apply_calculations(0, results);
    assert_eq!(plan.first_dirty(), None);
    assert!(plan.leg(0).is_some_and(|leg| leg.calculated.is_some()));

    plan.update_leg(1, 1, |leg| leg.leg.course = 250.0);
    assert_eq!(plan.first_dirty(), Some(1));
    let effects = plan.take_effects();
    assert!(effects.contains(&PlanEffect::LegChanged {
        segment_index: 1,
        leg_index: 1,
        change: ChangeKind::Changed,
    }));
}

#[test]
fn vertical_data_edits_replace_the_seeded_constraint() {
    let mut plan = skeleton();
    let mut leg = tf("ONE", 0.0, 0.0);
    leg.alt_desc = AltitudeRestrictionType::AtOrAbove;
    leg.altitude1 = 900.0;
    plan.add_leg(1, leg, None, LegFlags::NONE);
    // the definition seeds its constraint from the published leg
    assert!(plan
        .leg(0)
        .is_some_and(|leg| leg.vertical.alt_desc == AltitudeRestrictionType::AtOrAbove
            && leg.vertical.altitude1 == 900.0));

    let edited = VerticalData {
        alt_desc: AltitudeRestrictionType::At,
        altitude1: 1200.0,
        altitude2: 0.0,
    };
    assert!(plan.set_leg_vertical_data(1, 0, edited));
    assert!(plan.leg(0).is_some_and(|leg| leg.vertical == edited));
    assert!(!plan.set_leg_vertical_data(1, 5, edited));
}

#[test]
fn plan_copies_reset_journal_and_geometry() {
    let mut plan = skeleton();
    plan.add_leg(1, tf("ONE", 0.0, 0.0), None, LegFlags::NONE);
    plan.apply_calculations(0, vec![LegCalculations::default()]);
    plan.set_origin_airport(Some("KBOS".to_string()));

    let copy = plan.copy_to(PROC_PREVIEW_PLAN);
    assert_eq!(copy.index(), PROC_PREVIEW_PLAN);
    assert_eq!(copy.origin_airport(), Some("KBOS"));
    assert_eq!(copy.leg_count(), 1);
    assert_eq!(copy.first_dirty(), Some(0));
}

#[test]
fn registry_guards_the_active_pointer() {
    let mut registry = PlanRegistry::new();
    assert!(!registry.has_plan(PRIMARY_PLAN));
    registry.create_plan(PRIMARY_PLAN);
    assert!(registry.has_plan(PRIMARY_PLAN));

    // cannot activate an empty slot
    assert!(!registry.set_active_index(DTO_RANDOM_PLAN));
    assert_eq!(registry.active_index(), PRIMARY_PLAN);

    registry.create_plan(DTO_RANDOM_PLAN);
    assert!(registry.set_active_index(DTO_RANDOM_PLAN));
    assert_eq!(registry.active_index(), DTO_RANDOM_PLAN);

    assert!(registry.delete_plan(DTO_RANDOM_PLAN));
    assert!(!registry.has_plan(DTO_RANDOM_PLAN));
    assert!(!registry.delete_plan(DTO_RANDOM_PLAN));
}

#[test]
fn registry_copies_plans_between_slots() {
    let mut registry = PlanRegistry::new();
    let plan = registry.create_plan(PRIMARY_PLAN);
    plan.add_segment(SegmentType::Enroute, None);
    plan.add_leg(0, tf("ONE", 0.0, 0.0), None, LegFlags::NONE);

    assert!(registry.copy_plan(PRIMARY_PLAN, PROC_PREVIEW_PLAN));
    let copy = registry.plan(PROC_PREVIEW_PLAN).expect("copied plan");
    assert_eq!(copy.index(), PROC_PREVIEW_PLAN);
    assert_eq!(copy.leg_count(), 1);
    assert!(!registry.copy_plan(5, PRIMARY_PLAN));
}

#[test]
fn snapshot_round_trip_preserves_plans_and_invalidates_geometry() {
    let mut registry = PlanRegistry::new();
    let plan = registry.create_plan(PRIMARY_PLAN);
    plan.add_segment(SegmentType::Enroute, None);
    plan.add_leg(0, tf("ONE", 42.0, -71.0), None, LegFlags::NONE);
    plan.set_origin_airport(Some("KBOS".to_string()));
    plan.apply_calculations(0, vec![LegCalculations::default()]);
    plan.take_effects();

    let bytes = registry.export_snapshot().expect("encodes");
    let mut restored = PlanRegistry::new();
    restored.import_snapshot(&bytes).expect("decodes");

    let plan = restored.plan(PRIMARY_PLAN).expect("plan restored");
    assert_eq!(plan.origin_airport(), Some("KBOS"));
    assert_eq!(plan.leg_count(), 1);
    assert!(plan.leg(0).is_some_and(|leg| leg.leg.fix_icao == "ONE"));
    // geometry stays on the sending side, the receiver recomputes
    assert!(plan.leg(0).is_some_and(|leg| leg.calculated.is_none()));
    assert_eq!(plan.first_dirty(), Some(0));
}
