#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use lumoskart_api::{
    app_router,
    config::AppConfig,
    context::{RequestContext, UserRole, SESSION_ID_HEADER, USER_ID_HEADER, USER_ROLE_HEADER},
    db,
    entities::{order, product},
    errors::ServiceError,
    events::{self, EventSender},
    payment_gateway::{self, GatewayOrder, PaymentGateway},
    services::commerce::{
        AddToCartInput, CheckoutMode, ConfirmPaymentInput, ConfirmationOutcome, CreateProductInput,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const GATEWAY_SECRET: &str = "integration_gateway_secret";
pub const GATEWAY_KEY_ID: &str = "rzp_test_stub";

/// Deterministic in-process gateway. Order ids are sequential and signatures
/// are checked with the real HMAC scheme against [`GATEWAY_SECRET`].
#[derive(Default)]
pub struct StubGateway {
    counter: AtomicU64,
    pub fail_create: AtomicBool,
    pub created: Mutex<Vec<GatewayOrder>>,
}

impl StubGateway {
    pub fn last_order(&self) -> Option<GatewayOrder> {
        self.created.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        amount_minor_units: i64,
        currency: &str,
        _auto_capture: bool,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ServiceError::PaymentGateway(
                "gateway unreachable".to_string(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let order = GatewayOrder {
            id: format!("order_stub_{n}"),
            amount: amount_minor_units,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: Some("created".to_string()),
        };
        self.created.lock().unwrap().push(order.clone());
        Ok(order)
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        payment_gateway::verify_signature(GATEWAY_SECRET, order_id, payment_id, signature)
    }

    fn key_id(&self) -> &str {
        GATEWAY_KEY_ID
    }
}

/// Identity forwarded by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: &'static str,
    pub session: Option<String>,
}

impl Caller {
    fn new(role: &'static str) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            role,
            session: None,
        }
    }

    pub fn customer() -> Self {
        Self::new("customer").with_session(format!("sess-{}", Uuid::new_v4().simple()))
    }

    pub fn influencer() -> Self {
        Self::new("influencer")
    }

    pub fn admin() -> Self {
        Self::new("admin")
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn context(&self) -> RequestContext {
        let role: UserRole = self.role.parse().unwrap();
        let ctx = RequestContext::new(self.user_id, role);
        match &self.session {
            Some(session) => ctx.with_session(session.clone()),
            None => ctx,
        }
    }
}

/// Application wired against a fresh SQLite file and the stub gateway.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir");
        let db_path = db_dir.path().join("lumoskart_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            GATEWAY_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.db_max_connections = 5;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(StubGateway::default());
        let state = AppState::new(
            Arc::new(pool),
            Arc::new(cfg),
            Arc::new(EventSender::new(event_tx)),
            gateway.clone(),
        );

        Self {
            router: app_router(state.clone()),
            state,
            gateway,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        caller: Option<&Caller>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder
                .header(USER_ID_HEADER, caller.user_id.to_string())
                .header(USER_ROLE_HEADER, caller.role);
            if let Some(session) = &caller.session {
                builder = builder.header(SESSION_ID_HEADER, session);
            }
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn seed_product(
        &self,
        influencer_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                influencer_id,
                name: name.to_string(),
                description: None,
                price,
                stock,
            })
            .await
            .expect("seed product")
    }

    /// Cart checkout straight through to a settled order.
    pub async fn purchase(
        &self,
        caller: &Caller,
        items: &[(Uuid, i32)],
    ) -> Result<ConfirmationOutcome, ServiceError> {
        let ctx = caller.context();
        let services = &self.state.services;
        for &(product_id, quantity) in items {
            services
                .cart
                .add(
                    &ctx,
                    AddToCartInput {
                        product_id,
                        quantity: Some(quantity),
                    },
                )
                .await?;
        }

        let session = services.checkout.start_checkout(&ctx).await?;
        let payment_id = format!("pay_{}", Uuid::new_v4().simple());
        services
            .payments
            .confirm(
                &ctx,
                ConfirmPaymentInput {
                    signature: sign(&session.gateway_order_id, &payment_id),
                    gateway_payment_id: payment_id,
                    gateway_order_id: session.gateway_order_id,
                    mode: Some(CheckoutMode::Cart),
                    address: Some("221B Baker Street".to_string()),
                },
            )
            .await
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .unwrap()
            .expect("product exists")
            .stock
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find().count(&*self.state.db).await.unwrap()
    }
}

pub fn sign(order_id: &str, payment_id: &str) -> String {
    payment_gateway::compute_signature(GATEWAY_SECRET, order_id, payment_id)
}

pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .map(|s| s.parse().unwrap())
        .or_else(|| value.as_f64().and_then(|f| Decimal::try_from(f).ok()))
        .unwrap_or_else(|| panic!("not a decimal: {value}"))
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
