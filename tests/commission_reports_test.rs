//! Integration tests for commission accounting, dashboards and sold-products
//! reports, the order ledger admin operations and influencer withdrawals.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Datelike, Utc};
use common::{decimal, response_json, Caller, TestApp};
use lumoskart_api::entities::order::OrderStatus;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

// ==================== Commission Tests ====================

#[tokio::test]
async fn single_completed_order_splits_earnings_and_commission() {
    let app = TestApp::new().await;
    let influencer = Caller::influencer();
    let camera = app
        .seed_product(influencer.user_id, "Vlog Camera", dec!(1000.00), 3)
        .await;

    app.purchase(&Caller::customer(), &[(camera.id, 1)])
        .await
        .unwrap();

    let commission = &app.state.services.commission;
    let earnings = commission.influencer_earnings(influencer.user_id).await.unwrap();
    assert_eq!(earnings.earnings, dec!(900.00));
    assert_eq!(earnings.commission, dec!(100.00));
    assert_eq!(earnings.gross_sales, dec!(1000.00));
    assert_eq!(earnings.orders_count, 1);
    assert_eq!(commission.platform_commission().await.unwrap(), dec!(100.00));

    // Read-only and reproducible
    let again = commission.influencer_earnings(influencer.user_id).await.unwrap();
    assert_eq!(earnings, again);

    let body = response_json(
        app.request(Method::GET, "/api/v1/influencer/earnings", Some(&influencer), None)
            .await,
    )
    .await;
    assert_eq!(decimal(&body["data"]["earnings"]["earnings"]), dec!(900.00));
    assert_eq!(decimal(&body["data"]["withdrawals"]["pending_total"]), Decimal::ZERO);
}

#[tokio::test]
async fn only_completed_orders_count_toward_earnings() {
    let app = TestApp::new().await;
    let influencer = Caller::influencer();
    let admin = Caller::admin();
    let hoodie = app
        .seed_product(influencer.user_id, "Merch Hoodie", dec!(1200.00), 10)
        .await;

    let kept = app.purchase(&Caller::customer(), &[(hoodie.id, 1)]).await.unwrap();
    let shipped = app.purchase(&Caller::customer(), &[(hoodie.id, 2)]).await.unwrap();

    app.state
        .services
        .orders
        .update_status(&admin.context(), shipped.order_id, "Shipped")
        .await
        .unwrap();

    let earnings = app
        .state
        .services
        .commission
        .influencer_earnings(influencer.user_id)
        .await
        .unwrap();
    assert_eq!(earnings.gross_sales, dec!(1200.00));
    assert_eq!(earnings.earnings, dec!(1080.00));
    assert_eq!(earnings.orders_count, 1);
    assert_ne!(kept.order_id, shipped.order_id);
}

// ==================== Dashboard Tests ====================

#[tokio::test]
async fn influencer_dashboard_reports_current_month() {
    let app = TestApp::new().await;
    let influencer = Caller::influencer();
    let other = Caller::influencer();
    let mic = app.seed_product(influencer.user_id, "Mic", dec!(100.00), 50).await;
    let stand = app.seed_product(influencer.user_id, "Stand", dec!(20.00), 50).await;
    let foreign = app.seed_product(other.user_id, "Foreign", dec!(999.00), 50).await;

    app.purchase(&Caller::customer(), &[(mic.id, 2), (stand.id, 5)])
        .await
        .unwrap();
    app.purchase(&Caller::customer(), &[(mic.id, 1), (foreign.id, 1)])
        .await
        .unwrap();

    let response = app
        .request(Method::GET, "/api/v1/influencer/dashboard", Some(&influencer), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let dashboard = &body["data"];

    assert_eq!(decimal(&dashboard["total_revenue"]), dec!(400.00));
    assert_eq!(dashboard["total_orders"], 2);
    assert_eq!(decimal(&dashboard["monthly_revenue"]), dec!(400.00));
    assert_eq!(dashboard["monthly_orders"], 2);
    assert_eq!(decimal(&dashboard["previous_month_revenue"]), Decimal::ZERO);
    // No previous month to compare against
    assert_eq!(decimal(&dashboard["monthly_revenue_change"]), Decimal::ZERO);

    let top = dashboard["top_products"].as_array().unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["product_name"], "Stand");
    assert_eq!(top[0]["quantity_sold"], 5);
    assert_eq!(top[1]["quantity_sold"], 3);

    let customer = Caller::customer();
    let response = app
        .request(Method::GET, "/api/v1/influencer/dashboard", Some(&customer), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_dashboard_aggregates_completed_orders() {
    let app = TestApp::new().await;
    let admin = Caller::admin();
    let first = Caller::influencer();
    let second = Caller::influencer();
    let lamp = app.seed_product(first.user_id, "Lamp", dec!(300.00), 20).await;
    let tee = app.seed_product(second.user_id, "Tee", dec!(50.00), 20).await;

    app.purchase(&Caller::customer(), &[(lamp.id, 1), (tee.id, 2)])
        .await
        .unwrap();
    let canceled = app.purchase(&Caller::customer(), &[(tee.id, 4)]).await.unwrap();
    app.state
        .services
        .orders
        .update_status(&admin.context(), canceled.order_id, "Canceled")
        .await
        .unwrap();

    app.state
        .services
        .withdrawals
        .request_withdrawal(
            &first.context(),
            lumoskart_api::services::withdrawals::RequestWithdrawalInput { amount: dec!(100) },
        )
        .await
        .unwrap();

    let response = app
        .request(Method::GET, "/api/v1/admin/dashboard", Some(&admin), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let dashboard = &body["data"];

    assert_eq!(decimal(&dashboard["total_revenue"]), dec!(400.00));
    assert_eq!(decimal(&dashboard["total_commission"]), dec!(40.00));
    assert_eq!(decimal(&dashboard["commission_percentage"]), dec!(10.00));
    assert_eq!(decimal(&dashboard["total_influencer_earnings"]), dec!(360.00));
    assert_eq!(dashboard["orders"]["completed"], 1);
    assert_eq!(dashboard["orders"]["canceled"], 1);
    assert_eq!(dashboard["orders"]["total"], 2);

    let months = dashboard["monthly_revenue"].as_array().unwrap();
    assert_eq!(months.len(), 12);
    let now = Utc::now();
    assert_eq!(
        months[11]["month"],
        format!("{:04}-{:02}", now.year(), now.month())
    );
    assert_eq!(decimal(&months[11]["revenue"]), dec!(400.00));

    let influencers = dashboard["top_influencers"].as_array().unwrap();
    assert_eq!(influencers[0]["influencer_id"], first.user_id.to_string());
    assert_eq!(decimal(&influencers[0]["earnings"]), dec!(270.00));

    assert_eq!(dashboard["pending_withdrawals"].as_array().unwrap().len(), 1);

    let response = app
        .request(Method::GET, "/api/v1/admin/dashboard", Some(&first), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn product_sales_report_lists_every_product() {
    let app = TestApp::new().await;
    let admin = Caller::admin();
    let influencer = Caller::influencer();
    let a = app.seed_product(influencer.user_id, "Alpha", dec!(10.00), 20).await;
    let b = app.seed_product(influencer.user_id, "Bravo", dec!(10.00), 20).await;
    app.seed_product(influencer.user_id, "Unsold", dec!(10.00), 20).await;

    app.purchase(&Caller::customer(), &[(a.id, 1), (b.id, 4)])
        .await
        .unwrap();

    let body = response_json(
        app.request(
            Method::GET,
            "/api/v1/admin/reports/product-sales",
            Some(&admin),
            None,
        )
        .await,
    )
    .await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["product_name"], "Bravo");
    assert_eq!(rows[0]["quantity_sold"], 4);
    assert_eq!(rows[0]["influencer_id"], influencer.user_id.to_string());
    assert_eq!(rows[2]["product_name"], "Unsold");
    assert_eq!(rows[2]["quantity_sold"], 0);
}

#[tokio::test]
async fn sold_products_lists_completed_lines_with_window_totals() {
    let app = TestApp::new().await;
    let admin = Caller::admin();
    let influencer = Caller::influencer();
    let buyer = Caller::customer();
    let mic = app.seed_product(influencer.user_id, "Mic", dec!(100.00), 50).await;
    let stand = app.seed_product(influencer.user_id, "Stand", dec!(20.00), 50).await;
    let foreign = app
        .seed_product(Caller::influencer().user_id, "Foreign", dec!(999.00), 50)
        .await;

    let first = app
        .purchase(&buyer, &[(mic.id, 2), (foreign.id, 1)])
        .await
        .unwrap();
    app.purchase(&Caller::customer(), &[(stand.id, 3)])
        .await
        .unwrap();
    let canceled = app.purchase(&Caller::customer(), &[(mic.id, 1)]).await.unwrap();
    app.state
        .services
        .orders
        .update_status(&admin.context(), canceled.order_id, "Canceled")
        .await
        .unwrap();

    let response = app
        .request(
            Method::GET,
            "/api/v1/influencer/sold-products",
            Some(&influencer),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let report = &body["data"];

    let lines = report["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    let mic_line = lines
        .iter()
        .find(|l| l["product_name"] == "Mic")
        .unwrap();
    assert_eq!(mic_line["order_id"], first.order_id.to_string());
    assert_eq!(mic_line["customer_id"], buyer.user_id.to_string());
    assert_eq!(mic_line["quantity"], 2);
    assert_eq!(decimal(&mic_line["line_total"]), dec!(200.00));
    assert_eq!(decimal(&mic_line["earnings"]), dec!(180.00));

    // Everything settled just now falls in every window
    for window in ["daily", "weekly", "monthly"] {
        assert_eq!(decimal(&report[window]["revenue"]), dec!(260.00));
        assert_eq!(decimal(&report[window]["earnings"]), dec!(234.00));
    }

    let response = app
        .request(Method::GET, "/api/v1/influencer/sold-products", Some(&buyer), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ==================== Order Ledger Tests ====================

#[tokio::test]
async fn admin_lists_orders_by_influencer_and_status() {
    let app = TestApp::new().await;
    let admin = Caller::admin();
    let first = Caller::influencer();
    let second = Caller::influencer();
    let lamp = app.seed_product(first.user_id, "Lamp", dec!(30.00), 20).await;
    let tee = app.seed_product(second.user_id, "Tee", dec!(15.00), 20).await;

    app.purchase(&Caller::customer(), &[(lamp.id, 1)]).await.unwrap();
    app.purchase(&Caller::customer(), &[(lamp.id, 1), (tee.id, 1)])
        .await
        .unwrap();
    app.purchase(&Caller::customer(), &[(tee.id, 1)]).await.unwrap();

    let uri = format!("/api/v1/admin/orders?influencer_id={}", first.user_id);
    let body = response_json(app.request(Method::GET, &uri, Some(&admin), None).await).await;
    assert_eq!(body["data"]["total"], 2);

    let body = response_json(
        app.request(
            Method::GET,
            "/api/v1/admin/orders?status=completed&limit=2",
            Some(&admin),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 2);

    let response = app
        .request(Method::GET, "/api/v1/admin/orders?status=lost", Some(&admin), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let customer = Caller::customer();
    let response = app
        .request(Method::GET, "/api/v1/admin/orders", Some(&customer), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn order_summary_is_owner_only() {
    let app = TestApp::new().await;
    let owner = Caller::customer();
    let lamp = app
        .seed_product(Caller::influencer().user_id, "Lamp", dec!(30.00), 20)
        .await;
    let outcome = app.purchase(&owner, &[(lamp.id, 1)]).await.unwrap();
    let uri = format!("/api/v1/orders/{}/summary", outcome.order_id);

    let response = app
        .request(Method::GET, &uri, Some(&Caller::customer()), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.request(Method::GET, &uri, Some(&Caller::admin()), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_update_and_refunds() {
    let app = TestApp::new().await;
    let admin = Caller::admin();
    let lamp = app
        .seed_product(Caller::influencer().user_id, "Lamp", dec!(300.00), 20)
        .await;
    let outcome = app
        .purchase(&Caller::customer(), &[(lamp.id, 2)])
        .await
        .unwrap();

    let status_uri = format!("/api/v1/admin/orders/{}/status", outcome.order_id);
    let body = response_json(
        app.request(
            Method::PUT,
            &status_uri,
            Some(&admin),
            Some(json!({ "status": "shipped" })),
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["status"], "Shipped");
    assert_eq!(body["data"]["version"], 2);
    // Financial fields untouched
    assert_eq!(decimal(&body["data"]["total_amount"]), dec!(600.00));

    let response = app
        .request(
            Method::PUT,
            &status_uri,
            Some(&admin),
            Some(json!({ "status": "misplaced" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let refund_uri = format!("/api/v1/admin/orders/{}/refund", outcome.order_id);
    let response = app
        .request(
            Method::POST,
            &refund_uri,
            Some(&admin),
            Some(json!({ "type": "partial", "amount": "700.00" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(
        app.request(
            Method::POST,
            &refund_uri,
            Some(&admin),
            Some(json!({ "type": "partial", "amount": "100.00" })),
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["full"], false);
    assert_eq!(body["data"]["order"]["status"], "Shipped");

    let body = response_json(
        app.request(Method::POST, &refund_uri, Some(&admin), Some(json!({ "type": "full" })))
            .await,
    )
    .await;
    assert_eq!(body["data"]["full"], true);
    assert_eq!(decimal(&body["data"]["refunded_amount"]), dec!(600.00));
    assert_eq!(body["data"]["order"]["status"], "Canceled");

    let response = app
        .request(Method::POST, &refund_uri, Some(&admin), Some(json!({ "type": "full" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Refunds never restore stock
    assert_eq!(app.stock_of(lamp.id).await, 18);

    let order = app
        .state
        .services
        .orders
        .order_summary(&admin.context(), outcome.order_id)
        .await
        .unwrap();
    assert_eq!(order.order.status, OrderStatus::Canceled);
}

// ==================== Withdrawal Tests ====================

#[tokio::test]
async fn withdrawal_request_and_review_over_http() {
    let app = TestApp::new().await;
    let influencer = Caller::influencer();
    let admin = Caller::admin();

    let response = app
        .request(
            Method::POST,
            "/api/v1/influencer/withdrawals",
            Some(&influencer),
            Some(json!({ "amount": "250.00" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "pending");
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            "/api/v1/influencer/withdrawals",
            Some(&Caller::customer()),
            Some(json!({ "amount": "10.00" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let review_uri = format!("/api/v1/admin/withdrawals/{}/review", request_id);
    let response = app
        .request(
            Method::POST,
            &review_uri,
            Some(&admin),
            Some(json!({ "decision": "complete" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(
        app.request(
            Method::POST,
            &review_uri,
            Some(&admin),
            Some(json!({ "decision": "approve", "admin_notes": "ok" })),
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["admin_notes"], "ok");

    let body = response_json(
        app.request(Method::GET, "/api/v1/influencer/earnings", Some(&influencer), None)
            .await,
    )
    .await;
    assert_eq!(
        body["data"]["withdrawals"]["requests"].as_array().unwrap().len(),
        1
    );
    assert_eq!(
        decimal(&body["data"]["withdrawals"]["pending_total"]),
        Decimal::ZERO
    );
}
