use super::*;

fn item(identifier: &str, order_index: usize) -> CollectionItem {
    CollectionItem {
        identifier: IntegrationId::new(identifier),
        name: identifier.to_uppercase(),
        order_index,
        is_active: true,
        config: BTreeMap::new(),
    }
}

fn abc() -> Vec<CollectionItem> {
    vec![item("A", 0), item("B", 1), item("C", 2)]
}

fn identifiers(items: &[CollectionItem]) -> Vec<&str> {
    items.iter().map(|item| item.identifier.as_str()).collect()
}

fn synced_controller() -> OrderedCollectionController {
    let mut controller = OrderedCollectionController::default();
    controller
        .apply(OrderEvent::Synced(abc()))
        .expect("sync");
    controller
}

fn failure() -> ClientError {
    ClientError::Server {
        status: 503,
        message: "unavailable".into(),
    }
}

#[test]
fn every_move_keeps_indices_contiguous() {
    let items: Vec<CollectionItem> = (0..5).map(|i| item(&format!("i{i}"), i)).collect();
    for from in 0..items.len() {
        for to in 0..items.len() {
            let moved = reorder(&items, from, to).expect("valid move");
            let mut indices: Vec<usize> = moved.iter().map(|item| item.order_index).collect();
            indices.sort_unstable();
            assert_eq!(indices, (0..items.len()).collect::<Vec<_>>(), "{from}->{to}");
            assert_eq!(moved[to].identifier, items[from].identifier);
        }
    }
}

#[test]
fn out_of_bounds_move_is_rejected() {
    let err = reorder(&abc(), 0, 3).expect_err("to is past the end");
    assert_eq!(
        err,
        ReorderError::OutOfBounds {
            from: 0,
            to: 3,
            len: 3
        }
    );
}

#[test]
fn snapshot_is_sorted_by_backend_order() {
    let mut integrations = vec![
        crate::test_support::integration("jira", 7, true),
        crate::test_support::integration("slack", 2, false),
        crate::test_support::integration("email", 5, true),
    ];
    integrations[0].config_keys.push(shared::protocol::ConfigKey {
        key: "notify".into(),
        label: "Notify".into(),
        value: Some("true".into()),
        field_type: ConfigFieldType::Boolean,
        help_text: None,
        is_required: false,
    });

    let items = collection_from_integrations(&integrations);

    assert_eq!(identifiers(&items), vec!["slack", "email", "jira"]);
    assert_eq!(
        items.iter().map(|item| item.order_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(items[2].config.get("notify"), Some(&ConfigValue::Flag(true)));
}

#[test]
fn dragging_first_to_last_persists_new_order() {
    let mut controller = synced_controller();

    let effects = controller
        .apply(OrderEvent::Moved { from: 0, to: 2 })
        .expect("move");

    assert_eq!(identifiers(controller.items()), vec!["B", "C", "A"]);
    assert_eq!(
        controller
            .items()
            .iter()
            .map(|item| item.order_index)
            .collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        effects,
        vec![Effect::PersistOrder {
            revision: Revision(1),
            order: vec![
                IntegrationId::new("B"),
                IntegrationId::new("C"),
                IntegrationId::new("A"),
            ],
        }]
    );
}

#[test]
fn failed_persist_reverts_to_confirmed_order() {
    let mut controller = synced_controller();
    controller
        .apply(OrderEvent::Moved { from: 0, to: 2 })
        .expect("move");

    let effects = controller
        .apply(OrderEvent::PersistSettled {
            revision: Revision(1),
            result: Err(failure()),
        })
        .expect("settle");

    assert_eq!(identifiers(controller.items()), vec!["A", "B", "C"]);
    assert!(!controller.is_persisting());
    assert!(matches!(
        effects.as_slice(),
        [Effect::Surface(indicator)] if indicator.scope == FailureScope::Ordering
    ));
}

#[test]
fn successful_persist_confirms_and_refetches() {
    let mut controller = synced_controller();
    controller
        .apply(OrderEvent::Moved { from: 2, to: 0 })
        .expect("move");

    let effects = controller
        .apply(OrderEvent::PersistSettled {
            revision: Revision(1),
            result: Ok(()),
        })
        .expect("settle");

    assert_eq!(effects, vec![Effect::Refetch(Resource::Integrations)]);
    assert_eq!(identifiers(controller.confirmed()), vec!["C", "A", "B"]);
}

#[test]
fn newest_local_order_is_persisted_after_in_flight_one() {
    let mut controller = synced_controller();
    controller
        .apply(OrderEvent::Moved { from: 0, to: 2 })
        .expect("first move");
    let queued = controller
        .apply(OrderEvent::Moved { from: 0, to: 1 })
        .expect("second move");
    assert!(queued.is_empty());
    assert_eq!(identifiers(controller.items()), vec!["C", "B", "A"]);

    let follow_up = controller
        .apply(OrderEvent::PersistSettled {
            revision: Revision(1),
            result: Ok(()),
        })
        .expect("settle first");

    assert_eq!(
        follow_up,
        vec![Effect::PersistOrder {
            revision: Revision(2),
            order: vec![
                IntegrationId::new("C"),
                IntegrationId::new("B"),
                IntegrationId::new("A"),
            ],
        }]
    );
    assert_eq!(identifiers(controller.items()), vec!["C", "B", "A"]);
}

#[test]
fn stale_persist_failure_does_not_revert_newer_order() {
    let mut controller = synced_controller();
    controller
        .apply(OrderEvent::Moved { from: 0, to: 2 })
        .expect("first move");
    controller
        .apply(OrderEvent::Moved { from: 0, to: 1 })
        .expect("second move");

    let follow_up = controller
        .apply(OrderEvent::PersistSettled {
            revision: Revision(1),
            result: Err(failure()),
        })
        .expect("settle first");

    assert!(matches!(
        follow_up.as_slice(),
        [Effect::PersistOrder { revision: Revision(2), .. }]
    ));
    assert_eq!(identifiers(controller.items()), vec!["C", "B", "A"]);

    controller
        .apply(OrderEvent::PersistSettled {
            revision: Revision(2),
            result: Err(failure()),
        })
        .expect("settle second");
    assert_eq!(identifiers(controller.items()), vec!["A", "B", "C"]);
}

#[test]
fn refresh_during_persist_does_not_clobber_local_order() {
    let mut controller = synced_controller();
    controller
        .apply(OrderEvent::Moved { from: 0, to: 2 })
        .expect("move");

    controller
        .apply(OrderEvent::Synced(abc()))
        .expect("refresh");

    assert_eq!(identifiers(controller.items()), vec!["B", "C", "A"]);
    assert_eq!(identifiers(controller.confirmed()), vec!["A", "B", "C"]);
}

#[test]
fn unknown_settlement_is_ignored() {
    let mut controller = synced_controller();

    let effects = controller
        .apply(OrderEvent::PersistSettled {
            revision: Revision(9),
            result: Ok(()),
        })
        .expect("settle");

    assert!(effects.is_empty());
    assert_eq!(identifiers(controller.items()), vec!["A", "B", "C"]);
}
