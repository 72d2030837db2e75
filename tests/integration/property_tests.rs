#![allow(missing_docs)]

use std::fs;

use foodshare::{FoodRequest, Operation, RequestStatus, Store, StoreError, StoreOptions};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Add { receiver: usize, food: String },
    Cancel { target: usize, receiver: usize },
    Fulfill { target: usize },
    Delete { target: usize, receiver: usize },
}

const RECEIVERS: [&str; 3] = ["alice", "bob", "carol"];

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..RECEIVERS.len(), "[a-z]{1,8}").prop_map(|(receiver, food)| Step::Add { receiver, food }),
        (0usize..16, 0..RECEIVERS.len())
            .prop_map(|(target, receiver)| Step::Cancel { target, receiver }),
        (0usize..16).prop_map(|target| Step::Fulfill { target }),
        (0usize..16, 0..RECEIVERS.len())
            .prop_map(|(target, receiver)| Step::Delete { target, receiver }),
    ]
}

#[derive(Debug, Clone, PartialEq)]
struct Expected {
    id: String,
    receiver: &'static str,
    food: String,
    status: RequestStatus,
    fulfilled_by: Option<&'static str>,
}

fn matches_model(actual: &[FoodRequest], model: &[Expected]) -> bool {
    actual.len() == model.len()
        && actual.iter().zip(model).all(|(a, e)| {
            a.id.as_str() == e.id
                && a.receiver == e.receiver
                && a.food_type == e.food
                && a.status == e.status
                && a.fulfilled_by.as_deref() == e.fulfilled_by
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn request_lifecycle_matches_reference_model(steps in prop::collection::vec(arb_step(), 1..40)) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreOptions::scratch(dir.path())).unwrap();
        let mut model: Vec<Expected> = Vec::new();
        let mut issued: Vec<String> = Vec::new();

        for step in steps {
            match step {
                Step::Add { receiver, food } => {
                    let id = store.add_request(RECEIVERS[receiver], &food, "1").unwrap();
                    issued.push(id.0.clone());
                    model.push(Expected {
                        id: id.0,
                        receiver: RECEIVERS[receiver],
                        food,
                        status: RequestStatus::Pending,
                        fulfilled_by: None,
                    });
                }
                Step::Cancel { target, receiver } => {
                    let Some(id) = issued.get(target) else { continue };
                    let outcome = store.cancel_request(id, RECEIVERS[receiver]);
                    let slot = model.iter_mut().find(|e| &e.id == id);
                    match slot {
                        Some(e) if e.receiver == RECEIVERS[receiver]
                            && e.status == RequestStatus::Pending =>
                        {
                            prop_assert!(outcome.is_ok());
                            e.status = RequestStatus::Cancelled;
                        }
                        _ => prop_assert!(matches!(outcome, Err(StoreError::NotFound(_)))),
                    }
                }
                Step::Fulfill { target } => {
                    let Some(id) = issued.get(target) else { continue };
                    let outcome = store.fulfill_request(id, "dana");
                    let slot = model.iter_mut().find(|e| &e.id == id);
                    match slot {
                        Some(e) if e.status == RequestStatus::Pending => {
                            prop_assert!(outcome.is_ok());
                            e.status = RequestStatus::Fulfilled;
                            e.fulfilled_by = Some("dana");
                        }
                        _ => prop_assert!(matches!(outcome, Err(StoreError::NotFound(_)))),
                    }
                }
                Step::Delete { target, receiver } => {
                    let Some(id) = issued.get(target) else { continue };
                    let outcome = store.delete_request(id, RECEIVERS[receiver]);
                    let pos = model
                        .iter()
                        .position(|e| &e.id == id && e.receiver == RECEIVERS[receiver]);
                    match pos {
                        Some(pos) => {
                            prop_assert!(outcome.is_ok());
                            model.remove(pos);
                        }
                        None => prop_assert!(matches!(outcome, Err(StoreError::NotFound(_)))),
                    }
                }
            }
        }

        let actual = store.list_requests().unwrap();
        prop_assert!(matches_model(&actual, &model), "store {:?} vs model {:?}", actual, model);
        prop_assert!(store.locks().snapshot().is_idle());
    }

    #[test]
    fn delimiters_in_values_never_reach_disk(
        prefix in "[a-z]{0,6}",
        bad in prop::sample::select(vec!["|", "\n", "\r", "a|b", "x\ny"]),
        suffix in "[a-z]{0,6}",
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreOptions::scratch(dir.path())).unwrap();
        let value = format!("{prefix}{bad}{suffix}");

        let err = store.add_food("dana", &value, "1", "market").unwrap_err();
        prop_assert_eq!(err.code(), "invalid");
        let err = store.register(&value, "pw", "donor").unwrap_err();
        prop_assert_eq!(err.code(), "invalid");
        let err = store.add_request("alice", "rice", &value).unwrap_err();
        prop_assert_eq!(err.code(), "invalid");

        for file in ["users.txt", "food.txt", "requests.txt"] {
            prop_assert!(fs::read_to_string(dir.path().join(file)).unwrap().is_empty());
        }
    }

    #[test]
    fn operation_names_parse_from_camel_case(index in 0usize..Operation::ALL.len()) {
        let op = Operation::ALL[index];
        let camel: String = op
            .name()
            .split('_')
            .enumerate()
            .map(|(i, part)| {
                if i == 0 {
                    part.to_string()
                } else {
                    let mut chars = part.chars();
                    chars
                        .next()
                        .map(|c| c.to_ascii_uppercase().to_string() + chars.as_str())
                        .unwrap_or_default()
                }
            })
            .collect();
        prop_assert_eq!(camel.parse::<Operation>().unwrap(), op);
    }
}
