use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bite_core::{FanOut, Outbox, RandomSource};
use bite_shared::CreateDeliveryRequest;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::{Courier, Delivery, DeliveryStatus, NewCourier};

const MIN_ESTIMATE_MINUTES: u32 = 30;
const ESTIMATE_SPREAD_MINUTES: u32 = 30;
const ACTUAL_SPREAD_MINUTES: u32 = 20;
const MIN_ACTUAL_MINUTES: u32 = 10;

/// Owns deliveries and the courier pool.
///
/// Courier assignment is first-fit in courier id order. When nobody is free
/// the delivery stays `pending` and nothing revisits it automatically.
pub struct DeliveryDispatcher {
    fleet: Mutex<Fleet>,
    outbox: Outbox,
    random: Arc<dyn RandomSource>,
}

struct Fleet {
    deliveries: BTreeMap<u64, Delivery>,
    couriers: BTreeMap<u64, Courier>,
    /// Idempotency key -> delivery it created
    keys: HashMap<String, u64>,
    next_delivery_id: u64,
    next_courier_id: u64,
}

impl Fleet {
    /// First available courier, marked busy
    fn claim_courier(&mut self) -> Option<u64> {
        let courier = self.couriers.values_mut().find(|courier| courier.available)?;
        courier.available = false;
        Some(courier.id)
    }

    fn release_courier(&mut self, courier_id: u64) {
        if let Some(courier) = self.couriers.get_mut(&courier_id) {
            courier.available = true;
        }
    }

    fn insert_courier(&mut self, new_courier: NewCourier) -> Courier {
        let id = self.next_courier_id;
        self.next_courier_id += 1;

        let courier = Courier {
            id,
            name: new_courier.name,
            phone: new_courier.phone,
            available: new_courier.available.unwrap_or(true),
            location: new_courier.location,
        };
        self.couriers.insert(id, courier.clone());
        courier
    }
}

impl DeliveryDispatcher {
    pub fn new(outbox: Outbox, random: Arc<dyn RandomSource>) -> Self {
        Self {
            fleet: Mutex::new(Fleet {
                deliveries: BTreeMap::new(),
                couriers: BTreeMap::new(),
                keys: HashMap::new(),
                next_delivery_id: 1,
                next_courier_id: 1,
            }),
            outbox,
            random,
        }
    }

    /// Open a delivery and try to hand it to a courier straight away.
    /// A successful assignment moves the order to `preparing`.
    pub async fn create_delivery(&self, req: CreateDeliveryRequest) -> Delivery {
        self.create_delivery_with_key(req, None).await
    }

    /// As [`Self::create_delivery`], but a key seen before returns the
    /// delivery it opened. No second courier is claimed.
    pub async fn create_delivery_with_key(
        &self,
        req: CreateDeliveryRequest,
        idempotency_key: Option<&str>,
    ) -> Delivery {
        let now = Utc::now();
        let mut fleet = self.fleet.lock().await;
        if let Some(existing) = idempotency_key
            .and_then(|key| fleet.keys.get(key))
            .and_then(|id| fleet.deliveries.get(id))
        {
            tracing::debug!(delivery_id = existing.id, "Replaying delivery for repeated idempotency key");
            return existing.clone();
        }

        let estimated_time = req
            .estimated_time
            .filter(|minutes| *minutes > 0)
            .unwrap_or_else(|| MIN_ESTIMATE_MINUTES + self.random.below(ESTIMATE_SPREAD_MINUTES));
        let id = fleet.next_delivery_id;
        fleet.next_delivery_id += 1;

        let mut delivery = Delivery {
            id,
            order_id: req.order_id,
            user_id: req.user_id,
            restaurant_id: req.restaurant_id,
            courier_id: None,
            status: DeliveryStatus::Pending,
            address: req.address,
            estimated_time,
            actual_time: None,
            created_at: now,
            updated_at: now,
        };

        match fleet.claim_courier() {
            Some(courier_id) => {
                delivery.courier_id = Some(courier_id);
                delivery.status = DeliveryStatus::Assigned;
                self.outbox
                    .enqueue(FanOut::update_order_status(delivery.order_id, "preparing"));
                tracing::info!("Delivery {} assigned to courier {}", id, courier_id);
            }
            None => {
                tracing::warn!("No courier available for delivery {} (order {})", id, delivery.order_id);
            }
        }

        fleet.deliveries.insert(id, delivery.clone());
        if let Some(key) = idempotency_key {
            fleet.keys.insert(key.to_string(), id);
        }
        delivery
    }

    pub async fn get_delivery(&self, delivery_id: u64) -> Result<Delivery, DeliveryError> {
        let fleet = self.fleet.lock().await;
        fleet
            .deliveries
            .get(&delivery_id)
            .cloned()
            .ok_or(DeliveryError::NotFound(delivery_id))
    }

    pub async fn list_deliveries(&self) -> Vec<Delivery> {
        self.fleet.lock().await.deliveries.values().cloned().collect()
    }

    pub async fn list_by_order(&self, order_id: u64) -> Vec<Delivery> {
        let fleet = self.fleet.lock().await;
        fleet
            .deliveries
            .values()
            .filter(|delivery| delivery.order_id == order_id)
            .cloned()
            .collect()
    }

    pub async fn list_by_courier(&self, courier_id: u64) -> Vec<Delivery> {
        let fleet = self.fleet.lock().await;
        fleet
            .deliveries
            .values()
            .filter(|delivery| delivery.courier_id == Some(courier_id))
            .cloned()
            .collect()
    }

    /// Advance a delivery and report pickup and drop-off to the order service.
    ///
    /// A manual move to `assigned` runs the same first-fit scan as creation
    /// and fails when no courier is free.
    pub async fn update_status(
        &self,
        delivery_id: u64,
        status: DeliveryStatus,
    ) -> Result<Delivery, DeliveryError> {
        let mut fleet = self.fleet.lock().await;
        let current = fleet
            .deliveries
            .get(&delivery_id)
            .ok_or(DeliveryError::NotFound(delivery_id))?;

        if current.status == status {
            return Ok(current.clone());
        }
        if !current.status.can_transition_to(status) {
            return Err(DeliveryError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }
        let held_courier = current.courier_id;
        let estimated_time = current.estimated_time;

        let claimed_courier = if status == DeliveryStatus::Assigned {
            Some(fleet.claim_courier().ok_or(DeliveryError::NoCourierAvailable)?)
        } else {
            None
        };
        if status.releases_courier() {
            if let Some(courier_id) = held_courier {
                fleet.release_courier(courier_id);
            }
        }

        let delivery = fleet
            .deliveries
            .get_mut(&delivery_id)
            .ok_or(DeliveryError::NotFound(delivery_id))?;
        delivery.update_status(status);
        if claimed_courier.is_some() {
            delivery.courier_id = claimed_courier;
        }
        if status == DeliveryStatus::Delivered {
            delivery.actual_time = Some(self.actual_minutes(estimated_time));
        }
        let delivery = delivery.clone();

        let order_status = match status {
            DeliveryStatus::Assigned => Some("preparing"),
            DeliveryStatus::PickedUp => Some("out_for_delivery"),
            DeliveryStatus::Delivered => Some("delivered"),
            DeliveryStatus::Pending | DeliveryStatus::Cancelled => None,
        };
        if let Some(order_status) = order_status {
            self.outbox
                .enqueue(FanOut::update_order_status(delivery.order_id, order_status));
        }

        tracing::info!(delivery_id, status = %status, "Delivery status updated");
        Ok(delivery)
    }

    /// Estimate give or take ten minutes, never under ten
    fn actual_minutes(&self, estimated_time: u32) -> u32 {
        let offset = i64::from(self.random.below(ACTUAL_SPREAD_MINUTES)) - i64::from(ACTUAL_SPREAD_MINUTES / 2);
        let actual = (i64::from(estimated_time) + offset).max(i64::from(MIN_ACTUAL_MINUTES));
        u32::try_from(actual).unwrap_or(u32::MAX)
    }

    pub async fn create_courier(&self, new_courier: NewCourier) -> Courier {
        let courier = self.fleet.lock().await.insert_courier(new_courier);
        tracing::info!(courier_id = courier.id, name = %courier.name, "Courier registered");
        courier
    }

    pub async fn get_courier(&self, courier_id: u64) -> Result<Courier, DeliveryError> {
        let fleet = self.fleet.lock().await;
        fleet
            .couriers
            .get(&courier_id)
            .cloned()
            .ok_or(DeliveryError::CourierNotFound(courier_id))
    }

    pub async fn list_couriers(&self) -> Vec<Courier> {
        self.fleet.lock().await.couriers.values().cloned().collect()
    }

    /// Unconditional overwrite; in-flight deliveries are not consulted
    pub async fn set_availability(
        &self,
        courier_id: u64,
        available: bool,
    ) -> Result<Courier, DeliveryError> {
        let mut fleet = self.fleet.lock().await;
        let courier = fleet
            .couriers
            .get_mut(&courier_id)
            .ok_or(DeliveryError::CourierNotFound(courier_id))?;
        courier.available = available;
        Ok(courier.clone())
    }

    /// Demo courier present on a fresh deployment
    pub async fn seed_sample_data(&self) {
        self.fleet.lock().await.insert_courier(NewCourier {
            name: "John Doe".to_string(),
            phone: "555-1234".to_string(),
            location: "Downtown".to_string(),
            available: Some(true),
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery not found")]
    NotFound(u64),

    #[error("Courier not found")]
    CourierNotFound(u64),

    #[error("Invalid status value")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("No courier available")]
    NoCourierAvailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bite_core::{OutboxReceiver, ScriptedRandom};

    fn dispatcher(random: ScriptedRandom) -> (DeliveryDispatcher, OutboxReceiver) {
        let (outbox, receiver) = Outbox::channel();
        (DeliveryDispatcher::new(outbox, Arc::new(random)), receiver)
    }

    fn request(order_id: u64) -> CreateDeliveryRequest {
        CreateDeliveryRequest {
            order_id,
            user_id: 1,
            restaurant_id: 2,
            address: "1 Main St".to_string(),
            estimated_time: None,
        }
    }

    fn courier(name: &str) -> NewCourier {
        NewCourier {
            name: name.to_string(),
            phone: "555-0000".to_string(),
            location: "Downtown".to_string(),
            available: None,
        }
    }

    #[tokio::test]
    async fn test_repeated_key_does_not_claim_second_courier() {
        let (dispatcher, mut outbox) = dispatcher(ScriptedRandom::constant(0));
        dispatcher.create_courier(courier("Ana")).await;
        let spare = dispatcher.create_courier(courier("Bo")).await;

        let first = dispatcher.create_delivery_with_key(request(5), Some("k-1")).await;
        let replay = dispatcher.create_delivery_with_key(request(5), Some("k-1")).await;

        assert_eq!(replay.id, first.id);
        assert_eq!(replay.courier_id, first.courier_id);
        assert_eq!(dispatcher.list_by_order(5).await.len(), 1);
        assert!(dispatcher.get_courier(spare.id).await.unwrap().available);
        assert_eq!(outbox.drain(), vec![FanOut::update_order_status(5, "preparing")]);
    }

    #[tokio::test]
    async fn test_first_fit_assignment() {
        let (dispatcher, mut outbox) = dispatcher(ScriptedRandom::new([12]));
        let first = dispatcher.create_courier(courier("Ana")).await;
        let second = dispatcher.create_courier(courier("Bo")).await;
        assert!(first.available);

        // first courier taken off the pool by hand, second one gets the job
        dispatcher.set_availability(first.id, false).await.unwrap();
        let delivery = dispatcher.create_delivery(request(5)).await;

        assert_eq!(delivery.status, DeliveryStatus::Assigned);
        assert_eq!(delivery.courier_id, Some(second.id));
        assert_eq!(delivery.estimated_time, 42);
        assert!(!dispatcher.get_courier(second.id).await.unwrap().available);
        assert_eq!(outbox.drain(), vec![FanOut::update_order_status(5, "preparing")]);
        assert_eq!(dispatcher.get_delivery(delivery.id).await.unwrap(), delivery);
    }

    #[tokio::test]
    async fn test_no_courier_leaves_delivery_pending() {
        let (dispatcher, mut outbox) = dispatcher(ScriptedRandom::constant(0));

        let delivery = dispatcher.create_delivery(request(5)).await;
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.courier_id, None);
        assert_eq!(delivery.estimated_time, 30);
        assert!(outbox.drain().is_empty());

        // manual assignment still needs a free courier
        let result = dispatcher.update_status(delivery.id, DeliveryStatus::Assigned).await;
        assert!(matches!(result, Err(DeliveryError::NoCourierAvailable)));
        assert_eq!(dispatcher.get_delivery(delivery.id).await.unwrap().status, DeliveryStatus::Pending);

        let courier = dispatcher.create_courier(courier("Ana")).await;
        let assigned = dispatcher.update_status(delivery.id, DeliveryStatus::Assigned).await.unwrap();
        assert_eq!(assigned.courier_id, Some(courier.id));
        assert_eq!(outbox.drain(), vec![FanOut::update_order_status(5, "preparing")]);
    }

    #[tokio::test]
    async fn test_pickup_and_drop_off() {
        // estimate 30 + 15, then actual offset 3 - 10
        let (dispatcher, mut outbox) = dispatcher(ScriptedRandom::new([15, 3]));
        let courier = dispatcher.create_courier(courier("Ana")).await;
        let delivery = dispatcher.create_delivery(request(8)).await;
        outbox.drain();

        let picked = dispatcher.update_status(delivery.id, DeliveryStatus::PickedUp).await.unwrap();
        assert_eq!(picked.status, DeliveryStatus::PickedUp);
        assert_eq!(outbox.drain(), vec![FanOut::update_order_status(8, "out_for_delivery")]);

        let delivered = dispatcher.update_status(delivery.id, DeliveryStatus::Delivered).await.unwrap();
        assert_eq!(delivered.estimated_time, 45);
        assert_eq!(delivered.actual_time, Some(38));
        assert!(dispatcher.get_courier(courier.id).await.unwrap().available);
        assert_eq!(outbox.drain(), vec![FanOut::update_order_status(8, "delivered")]);
        assert_eq!(dispatcher.list_by_courier(courier.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_actual_time_floor() {
        let (dispatcher, _outbox) = dispatcher(ScriptedRandom::new([0]));
        dispatcher.create_courier(courier("Ana")).await;
        let mut req = request(1);
        req.estimated_time = Some(12);
        let delivery = dispatcher.create_delivery(req).await;

        dispatcher.update_status(delivery.id, DeliveryStatus::PickedUp).await.unwrap();
        let delivered = dispatcher.update_status(delivery.id, DeliveryStatus::Delivered).await.unwrap();
        assert_eq!(delivered.estimated_time, 12);
        assert_eq!(delivered.actual_time, Some(10));
    }

    #[tokio::test]
    async fn test_cancel_frees_courier_without_order_update() {
        let (dispatcher, mut outbox) = dispatcher(ScriptedRandom::constant(0));
        let courier = dispatcher.create_courier(courier("Ana")).await;
        let delivery = dispatcher.create_delivery(request(3)).await;
        outbox.drain();

        let cancelled = dispatcher.update_status(delivery.id, DeliveryStatus::Cancelled).await.unwrap();
        assert_eq!(cancelled.status, DeliveryStatus::Cancelled);
        assert!(dispatcher.get_courier(courier.id).await.unwrap().available);
        assert!(outbox.drain().is_empty());

        let reopened = dispatcher.update_status(delivery.id, DeliveryStatus::PickedUp).await;
        assert!(matches!(
            reopened,
            Err(DeliveryError::InvalidTransition { from: DeliveryStatus::Cancelled, to: DeliveryStatus::PickedUp })
        ));
    }

    #[tokio::test]
    async fn test_courier_directory() {
        let (dispatcher, _outbox) = dispatcher(ScriptedRandom::constant(0));
        dispatcher.seed_sample_data().await;

        let couriers = dispatcher.list_couriers().await;
        assert_eq!(couriers.len(), 1);
        assert_eq!(couriers[0].name, "John Doe");

        let mut off_duty = courier("Cy");
        off_duty.available = Some(false);
        let created = dispatcher.create_courier(off_duty).await;
        assert_eq!(created.id, 2);
        assert!(!created.available);

        assert!(dispatcher.set_availability(2, true).await.unwrap().available);
        assert!(matches!(dispatcher.set_availability(9, true).await, Err(DeliveryError::CourierNotFound(9))));
        assert!(matches!(dispatcher.get_delivery(9).await, Err(DeliveryError::NotFound(9))));
        assert!(dispatcher.list_by_order(9).await.is_empty());
    }
}
