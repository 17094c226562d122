use crate::activity::{self, actions};
use crate::manager::FulfillmentManager;
use crate::models::{Order, Worker, WorkerRole};
use serde::Serialize;
use serde_json::json;
use velora_core::{Actor, ActorRole, EngineError};

/// Picks the worker for an order's city: exact match on the configured
/// operating city first, then the default pool (workers with no city,
/// serving everywhere). Inactive workers never appear in `pool`, but the
/// filter double-checks. Ties go to the lowest worker id so assignment
/// is deterministic under test.
pub fn select_candidate<'a>(city: &str, pool: &'a [Worker]) -> Option<&'a Worker> {
    pool.iter()
        .filter(|w| w.active)
        .find(|w| w.operating_city.as_deref() == Some(city))
        .or_else(|| {
            pool.iter()
                .filter(|w| w.active)
                .find(|w| w.operating_city.is_none())
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub order_id: i64,
    pub worker_id: i64,
    pub reassigned: bool,
    /// False when the order already belonged to this worker (no-op).
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkAssignOutcome {
    pub order_id: i64,
    pub success: bool,
    pub error: Option<String>,
}

impl FulfillmentManager {
    /// Best-effort staff auto-assignment at order creation. Losing the
    /// CAS race to a first responder is fine; the order keeps whoever won.
    pub(crate) async fn auto_assign_staff(
        &self,
        order: &Order,
    ) -> Result<Option<i64>, EngineError> {
        let pool = self.workers.list_active(WorkerRole::Staff).await?;
        let Some(candidate) = select_candidate(&order.delivery_city, &pool) else {
            tracing::info!(
                order_id = order.id,
                city = %order.delivery_city,
                "no packaging staff available, order left unassigned"
            );
            return Ok(None);
        };

        if !self
            .orders
            .cas_assign(order.id, candidate.role.slot(), candidate.id, None)
            .await?
        {
            return Ok(None);
        }
        self.activity
            .append(activity::record_system(
                order.id,
                actions::ORDER_ASSIGNED,
                json!({
                    "worker_id": candidate.id,
                    "worker_role": candidate.role.as_str(),
                    "auto": true,
                }),
            ))
            .await?;
        Ok(Some(candidate.id))
    }

    /// Assigns one order to a worker. Idempotent for the current assignee
    /// (no write, no duplicate activity); a different worker is a
    /// reassignment and is logged distinctly.
    pub async fn assign_order(
        &self,
        order_id: i64,
        worker_id: i64,
        actor: Actor,
    ) -> Result<AssignmentOutcome, EngineError> {
        let worker = self.load_assignable_worker(worker_id, actor).await?;
        let order = self.load_order(order_id).await?;
        Self::ensure_not_terminal(&order, actor)?;

        let slot = worker.role.slot();
        let current = order.assignee(slot);
        if current == Some(worker.id) {
            return Ok(AssignmentOutcome {
                order_id,
                worker_id: worker.id,
                reassigned: false,
                changed: false,
            });
        }

        if !self
            .orders
            .cas_assign(order_id, slot, worker.id, current)
            .await?
        {
            return Err(EngineError::ConcurrencyConflict(order_id));
        }

        let reassigned = current.is_some();
        let action = if reassigned {
            actions::ORDER_REASSIGNED
        } else {
            actions::ORDER_ASSIGNED
        };
        self.activity
            .append(activity::record(
                order_id,
                action,
                actor,
                json!({
                    "worker_id": worker.id,
                    "worker_role": worker.role.as_str(),
                    "previous_worker_id": current,
                }),
            ))
            .await?;

        Ok(AssignmentOutcome {
            order_id,
            worker_id: worker.id,
            reassigned,
            changed: true,
        })
    }

    /// Assigns a batch of orders to one worker, per-order rather than
    /// all-or-nothing: each order is re-checked for "still unassigned"
    /// by the CAS immediately before writing, and one claimed or
    /// terminal order fails only its own item.
    pub async fn bulk_assign(
        &self,
        order_ids: &[i64],
        worker_id: i64,
        actor: Actor,
    ) -> Result<Vec<BulkAssignOutcome>, EngineError> {
        let worker = self.load_assignable_worker(worker_id, actor).await?;

        let mut outcomes = Vec::with_capacity(order_ids.len());
        for &order_id in order_ids {
            let result = self.bulk_assign_one(order_id, &worker, actor).await;
            outcomes.push(match result {
                Ok(()) => BulkAssignOutcome {
                    order_id,
                    success: true,
                    error: None,
                },
                Err(e) => BulkAssignOutcome {
                    order_id,
                    success: false,
                    error: Some(e.to_string()),
                },
            });
        }
        Ok(outcomes)
    }

    async fn bulk_assign_one(
        &self,
        order_id: i64,
        worker: &Worker,
        actor: Actor,
    ) -> Result<(), EngineError> {
        let order = self.load_order(order_id).await?;
        Self::ensure_not_terminal(&order, actor)?;

        let slot = worker.role.slot();
        match order.assignee(slot) {
            Some(current) if current == worker.id => return Ok(()),
            Some(current) => {
                return Err(EngineError::Validation(format!(
                    "order {order_id} is already assigned to worker {current}"
                )))
            }
            None => {}
        }

        if !self.orders.cas_assign(order_id, slot, worker.id, None).await? {
            return Err(EngineError::ConcurrencyConflict(order_id));
        }
        self.activity
            .append(activity::record(
                order_id,
                actions::ORDER_ASSIGNED,
                actor,
                json!({
                    "worker_id": worker.id,
                    "worker_role": worker.role.as_str(),
                    "bulk": true,
                }),
            ))
            .await?;
        Ok(())
    }

    /// Admins may assign anyone; a worker may only claim for themselves.
    async fn load_assignable_worker(
        &self,
        worker_id: i64,
        actor: Actor,
    ) -> Result<Worker, EngineError> {
        let self_service = actor.id == worker_id && actor.role != ActorRole::Admin;
        if actor.role != ActorRole::Admin && !self_service {
            return Err(EngineError::Authorization {
                role: actor.role,
                action: format!("assign orders to worker {worker_id}"),
            });
        }
        let worker = self
            .workers
            .get_worker(worker_id)
            .await?
            .ok_or(EngineError::not_found("worker", worker_id))?;
        if !worker.active {
            return Err(EngineError::Validation(format!(
                "worker {worker_id} is inactive"
            )));
        }
        if self_service && worker.role.actor_role() != actor.role {
            return Err(EngineError::Authorization {
                role: actor.role,
                action: format!("claim orders as a {}", worker.role.as_str()),
            });
        }
        Ok(worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testutil::*;
    use crate::models::OrderStatus;

    #[test]
    fn exact_city_match_beats_the_default_pool() {
        let pool = vec![
            worker(1, WorkerRole::Staff, None),
            worker(2, WorkerRole::Staff, Some("Chittagong")),
            worker(3, WorkerRole::Staff, Some("Dhaka")),
        ];
        let picked = select_candidate("Dhaka", &pool).unwrap();
        assert_eq!(picked.id, 3);
    }

    #[test]
    fn unmatched_city_falls_back_to_the_default_pool() {
        let pool = vec![
            worker(2, WorkerRole::Staff, Some("Chittagong")),
            worker(4, WorkerRole::Staff, None),
        ];
        let picked = select_candidate("Sylhet", &pool).unwrap();
        assert_eq!(picked.id, 4);
    }

    #[test]
    fn inactive_workers_are_never_selected() {
        let mut idle = worker(5, WorkerRole::Staff, Some("Dhaka"));
        idle.active = false;
        assert!(select_candidate("Dhaka", &[idle]).is_none());
    }

    #[tokio::test]
    async fn assigning_twice_to_the_same_worker_writes_one_record() {
        let h = harness();
        h.store
            .insert_worker(worker(21, WorkerRole::Courier, Some("Dhaka")));
        h.store.put_order(order_at(80, OrderStatus::Processing));
        let admin = velora_core::Actor::admin(1);

        let first = h.manager.assign_order(80, 21, admin).await.unwrap();
        assert!(first.changed && !first.reassigned);

        let second = h.manager.assign_order(80, 21, admin).await.unwrap();
        assert!(!second.changed);

        let records: Vec<_> = h
            .store
            .activity_log()
            .into_iter()
            .filter(|a| a.action == "order.assigned")
            .collect();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn moving_to_a_different_worker_is_logged_as_reassignment() {
        let h = harness();
        h.store
            .insert_worker(worker(21, WorkerRole::Courier, Some("Dhaka")));
        h.store
            .insert_worker(worker(22, WorkerRole::Courier, Some("Dhaka")));
        h.store.put_order(order_at(81, OrderStatus::Processing));
        let admin = velora_core::Actor::admin(1);

        h.manager.assign_order(81, 21, admin).await.unwrap();
        let moved = h.manager.assign_order(81, 22, admin).await.unwrap();
        assert!(moved.reassigned);

        let log = h.store.activity_log();
        assert!(log.iter().any(|a| a.action == "order.reassigned"));
    }

    #[tokio::test]
    async fn inactive_worker_never_receives_assignments() {
        let h = harness();
        let mut idle = worker(23, WorkerRole::Courier, Some("Dhaka"));
        idle.active = false;
        h.store.insert_worker(idle);
        h.store.put_order(order_at(82, OrderStatus::Processing));

        let err = h
            .manager
            .assign_order(82, 23, velora_core::Actor::admin(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn bulk_assign_reports_per_item_and_never_aborts_the_batch() {
        let h = harness();
        h.store
            .insert_worker(worker(25, WorkerRole::Courier, Some("Dhaka")));
        for id in [90, 91, 93, 94] {
            h.store.put_order(order_at(id, OrderStatus::Processing));
        }
        // Order 92 is already delivered and must fail alone.
        h.store.put_order(order_at(92, OrderStatus::Delivered));

        let outcomes = h
            .manager
            .bulk_assign(&[90, 91, 92, 93, 94], 25, velora_core::Actor::admin(1))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 5);
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].order_id, 92);
        assert!(outcomes.iter().filter(|o| o.success).count() == 4);
    }

    #[tokio::test]
    async fn bulk_assign_skips_orders_claimed_by_someone_else() {
        let h = harness();
        h.store
            .insert_worker(worker(25, WorkerRole::Courier, Some("Dhaka")));
        let mut taken = order_at(95, OrderStatus::Processing);
        taken.assigned_courier_id = Some(99);
        h.store.put_order(taken);
        h.store.put_order(order_at(96, OrderStatus::Processing));

        let outcomes = h
            .manager
            .bulk_assign(&[95, 96], 25, velora_core::Actor::admin(1))
            .await
            .unwrap();
        assert!(!outcomes[0].success);
        assert!(outcomes[1].success);
    }

    #[tokio::test]
    async fn couriers_cannot_assign_orders_to_other_couriers() {
        let h = harness();
        h.store
            .insert_worker(worker(25, WorkerRole::Courier, Some("Dhaka")));
        h.store.put_order(order_at(97, OrderStatus::Processing));

        let err = h
            .manager
            .assign_order(97, 25, velora_core::Actor::courier(26))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization { .. }));
    }
}
