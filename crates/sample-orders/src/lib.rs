//! Sample plugin module: an in-memory order book.
//!
//! Build as a `cdylib`, package it under `lib/portico<major>.<minor>/` of an
//! `orders.ppkg` archive and drop the archive into the plugin root. The host
//! only accepts it from the same cargo build, since both sides must agree on
//! the build fingerprint.

use portico_plugin::axum::Json;
use portico_plugin::axum::extract::Path;
use portico_plugin::axum::http::StatusCode;
use portico_plugin::axum::response::IntoResponse;
use portico_plugin::portico_api::{
    HostEnvironment, ServiceCollection, ServiceResult, WebApplication,
};
use portico_plugin::{BoxError, EndpointDefinition, FromServices, export_module};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub item: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub item: String,
    pub quantity: u32,
}

#[derive(Debug, Default)]
pub struct OrderStore {
    orders: RwLock<Vec<Order>>,
}

impl OrderStore {
    pub fn list(&self) -> Vec<Order> {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: u64) -> Option<Order> {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|order| order.id == id)
            .cloned()
    }

    pub fn add(&self, new: NewOrder) -> Order {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let order = Order {
            id: orders.len() as u64 + 1,
            item: new.item,
            quantity: new.quantity,
        };
        orders.push(order.clone());
        order
    }
}

/// `GET /orders`, `GET /orders/{id}` and `POST /orders`.
pub struct OrderEndpoints;

impl FromServices for OrderEndpoints {
    fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
        Ok(OrderEndpoints)
    }
}

impl EndpointDefinition for OrderEndpoints {
    fn define_services(&self, services: &mut ServiceCollection) -> Result<(), BoxError> {
        services.try_add_singleton(OrderStore::default());
        Ok(())
    }

    fn define_endpoints(
        &self,
        app: &mut WebApplication,
        _env: &HostEnvironment,
    ) -> Result<(), BoxError> {
        let store = app.services().require::<OrderStore>()?;

        let list = Arc::clone(&store);
        app.map_get("/orders", move || {
            let store = Arc::clone(&list);
            async move { Json(store.list()) }
        });

        let lookup = Arc::clone(&store);
        app.map_get("/orders/{id}", move |Path(id): Path<u64>| {
            let store = Arc::clone(&lookup);
            async move {
                match store.get(id) {
                    Some(order) => Json(order).into_response(),
                    None => StatusCode::NOT_FOUND.into_response(),
                }
            }
        });

        app.map_post("/orders", move |Json(new): Json<NewOrder>| {
            let store = Arc::clone(&store);
            async move { (StatusCode::CREATED, Json(store.add(new))) }
        });
        Ok(())
    }
}

/// How many times the host has built [`OrderSwaggerDoc`]. Documentation
/// generators are never treated as endpoint definitions, so this stays zero.
pub static SWAGGER_DOC_INSTANCES: AtomicUsize = AtomicUsize::new(0);

/// API documentation for the order endpoints.
pub struct OrderSwaggerDoc;

impl FromServices for OrderSwaggerDoc {
    fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
        SWAGGER_DOC_INSTANCES.fetch_add(1, Ordering::SeqCst);
        Ok(OrderSwaggerDoc)
    }
}

impl EndpointDefinition for OrderSwaggerDoc {
    fn define_endpoints(
        &self,
        app: &mut WebApplication,
        _env: &HostEnvironment,
    ) -> Result<(), BoxError> {
        app.map_get("/swagger/orders.json", || async { "{}" });
        Ok(())
    }
}

export_module! {
    name: "orders",
    entry: Program,
    definitions: [OrderEndpoints, OrderSwaggerDoc],
}
