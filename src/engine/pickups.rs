use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::CourierStatus;
use crate::models::pickup::{
    CategoryItem, Pickup, PickupStatus, PickupType, ShoppingHistoryEntry, ShoppingItem,
};
use crate::models::shipment::{ProofBundle, MAX_AMOUNT};
use crate::state::AppState;
use crate::store::UpdateOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePickupRequest {
    pub pickup_type: PickupType,
    pub customer_name: String,
    pub customer_phone: String,
    pub address: String,
    #[serde(default)]
    pub category_items: Vec<CategoryItem>,
    #[serde(default)]
    pub shopping_items: Vec<ShoppingItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletePickupRequest {
    #[serde(default)]
    pub delivered_indices: Vec<usize>,
    pub proof: Option<ProofBundle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PickupFilter {
    pub status: Option<PickupStatus>,
    pub pickup_type: Option<PickupType>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PickupCompletion {
    pub pickup: Pickup,
    /// Present when this call delivered at least one new shopping item.
    pub history_entry: Option<ShoppingHistoryEntry>,
}

fn validate(req: &CreatePickupRequest) -> Result<(), AppError> {
    for (field, value) in [
        ("customer_name", &req.customer_name),
        ("customer_phone", &req.customer_phone),
        ("address", &req.address),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} cannot be empty")));
        }
    }

    match req.pickup_type {
        PickupType::PersonalShopping => {
            if req.shopping_items.is_empty() {
                return Err(AppError::Validation(
                    "personal shopping needs at least one item".to_string(),
                ));
            }
            if !req.category_items.is_empty() {
                return Err(AppError::Validation(
                    "personal shopping takes shopping_items only".to_string(),
                ));
            }
        }
        _ if !req.shopping_items.is_empty() => {
            return Err(AppError::Validation(
                "shopping_items are only valid for personal shopping".to_string(),
            ));
        }
        PickupType::SellerPickup if req.category_items.is_empty() => {
            return Err(AppError::Validation(
                "seller pickup needs at least one category line".to_string(),
            ));
        }
        _ => {}
    }

    let in_range = |value: i64| (0..=MAX_AMOUNT).contains(&value);
    if req
        .category_items
        .iter()
        .any(|i| i.quantity == 0 || !in_range(i.value))
    {
        return Err(AppError::Validation(format!(
            "category lines need a quantity > 0 and a value between 0 and {MAX_AMOUNT}"
        )));
    }
    if req
        .shopping_items
        .iter()
        .any(|i| !in_range(i.value) || i.name.trim().is_empty())
    {
        return Err(AppError::Validation(format!(
            "shopping items need a name and a value between 0 and {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

fn checked_total(values: impl IntoIterator<Item = i64>) -> Result<i64, AppError> {
    values
        .into_iter()
        .try_fold(0i64, |total, value| total.checked_add(value))
        .ok_or_else(|| AppError::Validation("pickup total value overflows".to_string()))
}

pub fn create_pickup(state: &AppState, req: CreatePickupRequest) -> Result<Pickup, AppError> {
    validate(&req)?;

    let shopping_items: Vec<ShoppingItem> = req
        .shopping_items
        .into_iter()
        .map(|item| ShoppingItem {
            is_delivered: false,
            ..item
        })
        .collect();
    let total_value = match req.pickup_type {
        PickupType::PersonalShopping => checked_total(shopping_items.iter().map(|i| i.value))?,
        _ => checked_total(req.category_items.iter().map(|i| i.value))?,
    };

    let now = Utc::now();
    let pickup = state.pickups.insert(Pickup {
        id: Uuid::new_v4(),
        pickup_type: req.pickup_type,
        status: PickupStatus::Pending,
        customer_name: req.customer_name.trim().to_string(),
        customer_phone: req.customer_phone.trim().to_string(),
        address: req.address.trim().to_string(),
        category_items: req.category_items,
        shopping_items,
        total_value,
        collected_value: 0,
        courier_id: None,
        courier_name: None,
        proof: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    })?;

    info!(
        pickup_id = %pickup.id,
        pickup_type = ?pickup.pickup_type,
        total_value = pickup.total_value,
        "pickup created"
    );
    Ok(pickup)
}

pub fn list_pickups(state: &AppState, filter: &PickupFilter) -> Vec<Pickup> {
    let mut pickups = state.pickups.find(|p| {
        filter.status.is_none_or(|status| p.status == status)
            && filter.pickup_type.is_none_or(|kind| p.pickup_type == kind)
    });
    pickups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    pickups
}

pub fn get_pickup(state: &AppState, id: Uuid) -> Result<Pickup, AppError> {
    state.pickups.require(&id, "pickup")
}

fn rejected(pickup: &Pickup, action: &str) -> AppError {
    AppError::PreconditionFailed(format!(
        "pickup {} is {}, cannot {action}",
        pickup.id,
        pickup.status.as_str()
    ))
}

/// Assigns (or reassigns) a courier while items are still outstanding.
pub fn assign_pickup(state: &AppState, id: Uuid, courier_id: Uuid) -> Result<Pickup, AppError> {
    let courier = state.couriers.require(&courier_id, "courier")?;
    if courier.status != CourierStatus::Active {
        return Err(AppError::PreconditionFailed(format!(
            "courier {courier_id} is not active"
        )));
    }

    let now = Utc::now();
    let outcome = state.pickups.update_if(
        &id,
        |p| {
            matches!(
                p.status,
                PickupStatus::Pending | PickupStatus::Assigned | PickupStatus::Partial
            )
        },
        |p| {
            p.courier_id = Some(courier.id);
            p.courier_name = Some(courier.name);
            if p.status == PickupStatus::Pending {
                p.status = PickupStatus::Assigned;
            }
            p.updated_at = now;
        },
    );

    match outcome {
        UpdateOutcome::Updated(pickup) => {
            state.metrics.transition("pickup", true);
            info!(pickup_id = %id, courier_id = %courier_id, "pickup assigned");
            Ok(pickup)
        }
        UpdateOutcome::NotModified(pickup) => {
            state.metrics.transition("pickup", false);
            Err(rejected(&pickup, "be assigned"))
        }
        UpdateOutcome::NotFound => Err(AppError::NotFound(format!("pickup {id} not found"))),
    }
}

pub fn cancel_pickup(state: &AppState, id: Uuid) -> Result<Pickup, AppError> {
    let now = Utc::now();
    match state.pickups.update_if(
        &id,
        |p| matches!(p.status, PickupStatus::Pending | PickupStatus::Assigned),
        |p| {
            p.status = PickupStatus::Cancelled;
            p.updated_at = now;
        },
    ) {
        UpdateOutcome::Updated(pickup) => {
            state.metrics.transition("pickup", true);
            info!(pickup_id = %id, "pickup cancelled");
            Ok(pickup)
        }
        UpdateOutcome::NotModified(pickup) => {
            state.metrics.transition("pickup", false);
            Err(rejected(&pickup, "be cancelled"))
        }
        UpdateOutcome::NotFound => Err(AppError::NotFound(format!("pickup {id} not found"))),
    }
}

/// Completes a pickup. Single-shot types complete outright (repeating is a
/// no-op). Personal shopping merges `delivered_indices` into the item set,
/// recomputes the collected value and derives the status; each call that
/// delivers something new appends exactly one history entry.
pub fn complete_pickup(
    state: &AppState,
    id: Uuid,
    req: CompletePickupRequest,
) -> Result<PickupCompletion, AppError> {
    let current = get_pickup(state, id)?;
    let now = Utc::now();
    let proof = req.proof.map(|mut p| {
        p.captured_at.get_or_insert(now);
        p
    });

    if current.pickup_type != PickupType::PersonalShopping {
        return complete_single_shot(state, id, proof, now);
    }

    let indices: BTreeSet<usize> = req.delivered_indices.into_iter().collect();
    if indices.is_empty() {
        return Err(AppError::Validation(
            "delivered_indices cannot be empty for personal shopping".to_string(),
        ));
    }
    if let Some(bad) = indices.iter().find(|i| **i >= current.shopping_items.len()) {
        return Err(AppError::Validation(format!(
            "item index {bad} out of range (pickup has {} items)",
            current.shopping_items.len()
        )));
    }

    let mut moved: Vec<usize> = Vec::new();
    let stored_proof = proof.clone();
    let outcome = state.pickups.update_if(
        &id,
        |p| {
            p.status != PickupStatus::Cancelled
                && indices.iter().any(|i| !p.shopping_items[*i].is_delivered)
        },
        |p| {
            for i in &indices {
                let item = &mut p.shopping_items[*i];
                if !item.is_delivered {
                    item.is_delivered = true;
                    moved.push(*i);
                }
            }
            p.collected_value = p.delivered_value();
            p.status = p.derived_shopping_status();
            if p.status == PickupStatus::Completed {
                p.completed_at = Some(now);
            }
            if stored_proof.is_some() {
                p.proof = stored_proof;
            }
            p.updated_at = now;
        },
    );

    let pickup = match outcome {
        UpdateOutcome::Updated(pickup) => pickup,
        UpdateOutcome::NotModified(pickup) if pickup.status == PickupStatus::Cancelled => {
            state.metrics.transition("pickup", false);
            return Err(rejected(&pickup, "deliver items"));
        }
        UpdateOutcome::NotModified(pickup) => {
            return Ok(PickupCompletion {
                pickup,
                history_entry: None,
            });
        }
        UpdateOutcome::NotFound => {
            return Err(AppError::NotFound(format!("pickup {id} not found")));
        }
    };
    state.metrics.transition("pickup", true);

    let entry = state.shopping_history.insert(ShoppingHistoryEntry {
        id: Uuid::new_v4(),
        pickup_id: id,
        item_names: moved
            .iter()
            .map(|i| pickup.shopping_items[*i].name.clone())
            .collect(),
        value_collected: moved.iter().map(|i| pickup.shopping_items[*i].value).sum(),
        item_indices: moved,
        courier_id: pickup.courier_id,
        proof,
        created_at: now,
    })?;

    if current.status != PickupStatus::Completed && pickup.status == PickupStatus::Completed {
        credit_pickup(state, &pickup);
    }

    info!(
        pickup_id = %id,
        delivered = entry.item_indices.len(),
        value_collected = entry.value_collected,
        collected_value = pickup.collected_value,
        total_value = pickup.total_value,
        status = pickup.status.as_str(),
        "personal shopping delivery recorded"
    );

    Ok(PickupCompletion {
        pickup,
        history_entry: Some(entry),
    })
}

/// Any live status completes in one step; a cancelled pickup stays cancelled.
fn complete_single_shot(
    state: &AppState,
    id: Uuid,
    proof: Option<ProofBundle>,
    now: DateTime<Utc>,
) -> Result<PickupCompletion, AppError> {
    let outcome = state.pickups.update_if(
        &id,
        |p| !matches!(p.status, PickupStatus::Completed | PickupStatus::Cancelled),
        |p| {
            p.status = PickupStatus::Completed;
            p.collected_value = p.total_value;
            p.completed_at = Some(now);
            if proof.is_some() {
                p.proof = proof;
            }
            p.updated_at = now;
        },
    );

    match outcome {
        UpdateOutcome::Updated(pickup) => {
            state.metrics.transition("pickup", true);
            credit_pickup(state, &pickup);
            info!(pickup_id = %id, pickup_type = ?pickup.pickup_type, "pickup completed");
            Ok(PickupCompletion {
                pickup,
                history_entry: None,
            })
        }
        UpdateOutcome::NotModified(pickup) if pickup.status == PickupStatus::Completed => {
            Ok(PickupCompletion {
                pickup,
                history_entry: None,
            })
        }
        UpdateOutcome::NotModified(pickup) => {
            state.metrics.transition("pickup", false);
            Err(rejected(&pickup, "be completed"))
        }
        UpdateOutcome::NotFound => Err(AppError::NotFound(format!("pickup {id} not found"))),
    }
}

/// A completed pickup counts as one finished job for its courier.
fn credit_pickup(state: &AppState, pickup: &Pickup) {
    let Some(courier_id) = pickup.courier_id else {
        return;
    };
    let now = Utc::now();
    state.couriers.update(&courier_id, |courier| {
        courier.total_deliveries = courier.total_deliveries.saturating_add(1);
        courier.updated_at = now;
    });
}

pub fn shopping_history(state: &AppState, id: Uuid) -> Result<Vec<ShoppingHistoryEntry>, AppError> {
    get_pickup(state, id)?;
    let mut entries = state.shopping_history.find(|e| e.pickup_id == id);
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(entries)
}

/// Rebuilds the delivered item set from the history ledger and compares it
/// with the cached projection on the pickup.
pub fn projection_matches_history(state: &AppState, id: Uuid) -> Result<bool, AppError> {
    let pickup = get_pickup(state, id)?;
    let from_history: BTreeSet<usize> = shopping_history(state, id)?
        .into_iter()
        .flat_map(|entry| entry.item_indices)
        .collect();
    let from_items: BTreeSet<usize> = pickup
        .shopping_items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_delivered)
        .map(|(i, _)| i)
        .collect();

    Ok(from_history == from_items && pickup.collected_value == pickup.delivered_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shopping(state: &AppState) -> Pickup {
        create_pickup(
            state,
            CreatePickupRequest {
                pickup_type: PickupType::PersonalShopping,
                customer_name: "Lena".to_string(),
                customer_phone: "9000000006".to_string(),
                address: "3 Park Ave".to_string(),
                category_items: Vec::new(),
                shopping_items: vec![
                    ShoppingItem {
                        name: "Laptop".to_string(),
                        value: 50_000,
                        is_delivered: false,
                    },
                    ShoppingItem {
                        name: "Mouse".to_string(),
                        value: 1_500,
                        is_delivered: false,
                    },
                ],
            },
        )
        .unwrap()
    }

    fn deliver(indices: &[usize]) -> CompletePickupRequest {
        CompletePickupRequest {
            delivered_indices: indices.to_vec(),
            proof: Some(ProofBundle {
                image_ref: Some("proof/1.jpg".to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn partial_then_full_delivery() {
        let state = AppState::default();
        let pickup = shopping(&state);
        assert_eq!(pickup.total_value, 51_500);

        let first = complete_pickup(&state, pickup.id, deliver(&[0])).unwrap();
        assert_eq!(first.pickup.status, PickupStatus::Partial);
        assert_eq!(first.pickup.collected_value, 50_000);
        assert_eq!(first.history_entry.unwrap().item_names, vec!["Laptop"]);

        let second = complete_pickup(&state, pickup.id, deliver(&[1])).unwrap();
        assert_eq!(second.pickup.status, PickupStatus::Completed);
        assert_eq!(second.pickup.collected_value, 51_500);
        assert_eq!(shopping_history(&state, pickup.id).unwrap().len(), 2);
        assert!(projection_matches_history(&state, pickup.id).unwrap());
    }

    #[test]
    fn repeating_indices_is_a_no_op() {
        let state = AppState::default();
        let pickup = shopping(&state);
        complete_pickup(&state, pickup.id, deliver(&[0])).unwrap();
        let again = complete_pickup(&state, pickup.id, deliver(&[0, 0])).unwrap();

        assert!(again.history_entry.is_none());
        assert_eq!(again.pickup.collected_value, 50_000);
        assert_eq!(shopping_history(&state, pickup.id).unwrap().len(), 1);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let state = AppState::default();
        let pickup = shopping(&state);
        assert!(matches!(
            complete_pickup(&state, pickup.id, deliver(&[5])),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn seller_pickup_completes_once() {
        let state = AppState::default();
        let pickup = create_pickup(
            &state,
            CreatePickupRequest {
                pickup_type: PickupType::SellerPickup,
                customer_name: "Shop".to_string(),
                customer_phone: "9000000007".to_string(),
                address: "Market Rd".to_string(),
                category_items: vec![CategoryItem {
                    category: "apparel".to_string(),
                    quantity: 12,
                    value: 3_000,
                }],
                shopping_items: Vec::new(),
            },
        )
        .unwrap();

        let done = complete_pickup(&state, pickup.id, CompletePickupRequest::default()).unwrap();
        assert_eq!(done.pickup.status, PickupStatus::Completed);
        assert_eq!(done.pickup.collected_value, 3_000);
        assert!(done.history_entry.is_none());

        let again = complete_pickup(&state, pickup.id, CompletePickupRequest::default()).unwrap();
        assert_eq!(again.pickup.completed_at, done.pickup.completed_at);
    }

    #[test]
    fn cancelled_pickup_cannot_complete() {
        let state = AppState::default();
        let pickup = shopping(&state);
        cancel_pickup(&state, pickup.id).unwrap();
        assert!(matches!(
            complete_pickup(&state, pickup.id, deliver(&[0])),
            Err(AppError::PreconditionFailed(_))
        ));
    }

    fn seller(state: &AppState, value: i64) -> Result<Pickup, AppError> {
        create_pickup(
            state,
            CreatePickupRequest {
                pickup_type: PickupType::SellerPickup,
                customer_name: "Shop".to_string(),
                customer_phone: "9000000008".to_string(),
                address: "Market Rd".to_string(),
                category_items: vec![
                    CategoryItem {
                        category: "footwear".to_string(),
                        quantity: 2,
                        value,
                    },
                    CategoryItem {
                        category: "bags".to_string(),
                        quantity: 1,
                        value,
                    },
                ],
                shopping_items: Vec::new(),
            },
        )
    }

    #[test]
    fn cancelled_seller_pickup_cannot_complete() {
        let state = AppState::default();
        let pickup = seller(&state, 400).unwrap();
        cancel_pickup(&state, pickup.id).unwrap();

        let err = complete_pickup(&state, pickup.id, CompletePickupRequest::default()).unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
        let current = get_pickup(&state, pickup.id).unwrap();
        assert_eq!(current.status, PickupStatus::Cancelled);
        assert_eq!(current.collected_value, 0);
    }

    #[test]
    fn item_values_above_the_cap_are_rejected() {
        let state = AppState::default();
        assert!(matches!(
            seller(&state, i64::MAX),
            Err(AppError::Validation(_))
        ));
        assert_eq!(seller(&state, MAX_AMOUNT).unwrap().total_value, 2 * MAX_AMOUNT);
        assert_eq!(state.pickups.len(), 1);
    }

    #[test]
    fn shopping_items_rejected_on_returns() {
        let state = AppState::default();
        let err = create_pickup(
            &state,
            CreatePickupRequest {
                pickup_type: PickupType::CustomerReturn,
                customer_name: "Ana".to_string(),
                customer_phone: "1".to_string(),
                address: "x".to_string(),
                category_items: Vec::new(),
                shopping_items: vec![ShoppingItem {
                    name: "Shoe".to_string(),
                    value: 10,
                    is_delivered: false,
                }],
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
