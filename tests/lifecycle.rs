mod common;

use axum::http::{Method, StatusCode};
use common::{method_path, setup_test_app, TestApp};
use crm_api::store::{DocStatus, Filter, NewDocument};
use crm_api::DocumentStore;
use serde_json::{json, Value};

async fn seed(app: &TestApp, doctype: &str, fields: Value) {
    let Value::Object(fields) = fields else {
        panic!("object expected")
    };
    app.store
        .insert(NewDocument::new(doctype, "Administrator", fields))
        .await
        .unwrap();
}

fn name_of(body: &Value, key: &str) -> String {
    body[key].as_str().unwrap().to_string()
}

async fn draft_sales_order(app: &TestApp) -> String {
    let (status, body) = app
        .post(
            &method_path("sales_order.create_sales_order"),
            json!({
                "customer": "Acme",
                "company": "Acme Holdings",
                "delivery_date": "2030-01-20",
                "items": [{"item_code": "PEN", "qty": 2, "rate": 5}],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Sales Order created");
    name_of(&body, "sales_order")
}

#[tokio::test]
async fn sales_order_update_submit_and_derived_documents() {
    let app = setup_test_app();
    let order = draft_sales_order(&app).await;

    let (status, body) = app
        .post(&method_path("sales_order.make_delivery_note"), json!({"sales_order": order}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only Submitted Sales Orders can be delivered");

    let (status, body) = app
        .post(&method_path("sales_order.cancel_sales_order"), json!({"name": order}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only Submitted Sales Orders can be cancelled");

    let (status, body) = app
        .json(
            Method::PUT,
            &method_path("sales_order.update_sales_order"),
            json!({
                "name": order,
                "price_list": "Wholesale",
                "items": [{"item_code": "PEN", "qty": 3, "rate": 5}],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Sales Order updated");
    let (_, body) = app
        .get(&format!("{}?name={}", method_path("sales_order.get_sales_order_by_id"), order))
        .await;
    assert_eq!(body["data"]["selling_price_list"], "Wholesale");
    assert_eq!(body["data"]["grand_total"].as_f64(), Some(15.0));

    let (status, body) = app
        .post(&method_path("sales_order.submit_sales_order"), json!({"name": order}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["docstatus"], 1);
    assert_eq!(body["order_status"], "To Deliver and Bill");

    let (status, body) = app
        .post(&method_path("sales_order.update_sales_order"), json!({"name": order, "project": "P1"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only Draft Sales Orders can be updated");

    let (status, body) = app
        .post(&method_path("sales_order.make_delivery_note"), json!({"sales_order": order}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let note = app.store.get("Delivery Note", &name_of(&body, "delivery_note")).await.unwrap();
    assert_eq!(note.str_field("customer"), Some("Acme"));
    assert_eq!(note.table("items")[0]["against_sales_order"], json!(order));

    let (status, body) = app
        .post(&method_path("sales_order.make_sales_invoice"), json!({"sales_order": order}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let invoice = app.store.get("Sales Invoice", &name_of(&body, "sales_invoice")).await.unwrap();
    assert_eq!(invoice.docstatus, DocStatus::Draft);
    assert_eq!(invoice.table("items")[0]["sales_order"], json!(order));
}

#[tokio::test]
async fn cancelling_and_deleting_sales_orders() {
    let app = setup_test_app();
    let cancelled = draft_sales_order(&app).await;
    app.post(&method_path("sales_order.submit_sales_order"), json!({"name": cancelled}))
        .await;
    let (status, body) = app
        .post(&method_path("sales_order.cancel_sales_order"), json!({"name": cancelled}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["docstatus"], 2);

    let submitted = draft_sales_order(&app).await;
    app.post(&method_path("sales_order.submit_sales_order"), json!({"name": submitted}))
        .await;
    let (status, body) = app
        .json(
            Method::DELETE,
            &method_path("sales_order.delete_sales_order"),
            json!({"name": submitted}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], format!("Sales Order {} deleted successfully", submitted));
    assert!(!app.store.exists("Sales Order", &submitted).await.unwrap());
    assert!(app.store.exists("Sales Order", &cancelled).await.unwrap());
}

#[tokio::test]
async fn delivery_note_update_checks_and_status_guards() {
    let app = setup_test_app();
    seed(&app, "Price List", json!({"price_list_name": "Standard Selling", "currency": "INR"})).await;
    seed(&app, "Warehouse", json!({"warehouse_name": "Stores", "account": "Stock In Hand"})).await;
    seed(&app, "Warehouse", json!({"warehouse_name": "Yard"})).await;
    seed(&app, "Item", json!({"item_code": "PEN", "item_name": "Pen", "stock_uom": "Nos"})).await;

    let (status, body) = app
        .post(
            &method_path("delivery_note.create_delivery_note"),
            json!({"customer": "Acme", "company": "Acme Holdings"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let note = name_of(&body, "delivery_note");
    let update = method_path("delivery_note.update_delivery_note");

    let (status, body) = app.post(&update, json!({"name": note})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "selling_price_list is mandatory");

    let (status, body) = app
        .post(
            &update,
            json!({"name": note, "selling_price_list": "Standard Selling", "items": [{"item_code": "PEN", "qty": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Warehouse is mandatory for item PEN");

    let (status, body) = app
        .post(
            &update,
            json!({
                "name": note,
                "selling_price_list": "Standard Selling",
                "items": [{"item_code": "PEN", "qty": 1, "warehouse": "Yard"}],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Warehouse 'Yard' has no account mapped for company 'Acme Holdings'");

    let (status, body) = app
        .json(
            Method::PUT,
            &update,
            json!({
                "name": note,
                "selling_price_list": "Standard Selling",
                "items": [{"item_code": "PEN", "qty": 4, "rate": 2.5, "warehouse": "Stores"}],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Delivery Note updated successfully");
    let stored = app.store.get("Delivery Note", &note).await.unwrap();
    assert_eq!(stored.str_field("price_list_currency"), Some("INR"));
    assert_eq!(stored.table("items")[0]["item_name"], "Pen");

    let (status, body) = app
        .post(&method_path("delivery_note.submit_delivery_note"), json!({"name": note}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["docstatus"], 1);
    assert_eq!(body["delivery_status"], "To Bill");

    let (status, body) = app
        .post(&update, json!({"name": note, "selling_price_list": "Standard Selling"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only Draft Delivery Notes can be updated");

    let (status, body) = app
        .json(
            Method::DELETE,
            &method_path("delivery_note.delete_delivery_note"),
            json!({"name": note}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only Draft Delivery Notes can be deleted");

    let cancel = method_path("delivery_note.cancel_delivery_note");
    let (status, body) = app.post(&cancel, json!({"name": note})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["docstatus"], 2);
    assert_eq!(body["delivery_status"], "Cancelled");

    let (status, body) = app.post(&cancel, json!({"name": note})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only Submitted Delivery Notes can be cancelled");
}

#[tokio::test]
async fn submitted_invoice_update_amends_and_resubmits() {
    let app = setup_test_app();
    let (status, body) = app
        .post(
            &method_path("sales_invoice.create_sales_invoice"),
            json!({
                "customer": "Acme",
                "company": "Acme Holdings",
                "items": [{"item_code": "PEN", "qty": 2, "rate": 5}],
                "submit": true,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["docstatus"], 1);
    let original = name_of(&body, "sales_invoice");
    assert!(original.starts_with("ACC-SINV-"));

    let (status, body) = app
        .post(
            &method_path("sales_invoice.update_sales_invoice"),
            json!({"name": original, "remarks": "revised"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "sales invoice updated successfully");
    assert_eq!(body["docstatus"], 1);
    let amended = name_of(&body, "sales_invoice");
    assert_eq!(amended, format!("{}-1", original));

    let old = app.store.get("Sales Invoice", &original).await.unwrap();
    assert_eq!(old.docstatus, DocStatus::Cancelled);
    let new = app.store.get("Sales Invoice", &amended).await.unwrap();
    assert_eq!(new.str_field("amended_from"), Some(original.as_str()));
    assert_eq!(new.str_field("remarks"), Some("revised"));

    let list = method_path("sales_invoice.list_sales_invoices");
    let (_, body) = app.get(&format!("{}?status=Cancelled", list)).await;
    assert_eq!(body["total"], 1);
    let (_, body) = app.get(&format!("{}?status=Submitted", list)).await;
    assert_eq!(body["total"], 1);

    let (status, body) = app
        .json(
            Method::DELETE,
            &method_path("sales_invoice.delete_sales_invoice"),
            json!({"name": amended}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], format!("Sales Invoice {} deleted", amended));

    let (status, body) = app
        .get(&format!("{}?name={}", method_path("sales_invoice.get_sales_invoice_by_id"), amended))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Sales Invoice not found");
}

#[tokio::test]
async fn opportunity_update_links_the_party() {
    let app = setup_test_app();
    let (status, body) = app
        .post(
            &method_path("opportunity.create_opportunity"),
            json!({
                "opportunity_from": "Lead",
                "party_name": "Walk-in",
                "status": "Open",
                "company": "Acme Holdings",
                "opportunity_date": "2025-01-10",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let opp = name_of(&body, "opportunity_id");
    let update = method_path("opportunity.update_opportunity");
    let linked = json!({
        "opportunity_id": opp,
        "party_name": "Grace Hopper",
        "contact_email": "grace@example.com",
        "organization_name": "Navy",
    });

    let (status, body) = app.post(&update, linked.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Opportunity updated successfully");
    let lead = app
        .store
        .find_one("Lead", vec![Filter::eq("email_id", "grace@example.com")])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lead.str_field("first_name"), Some("Grace"));
    assert_eq!(lead.str_field("last_name"), Some("Hopper"));
    assert_eq!(lead.str_field("company_name"), Some("Navy"));
    let stored = app.store.get("Opportunity", &opp).await.unwrap();
    assert_eq!(stored.str_field("party_name"), Some(lead.name.as_str()));
    assert_eq!(stored.str_field("customer_name"), Some("Grace Hopper"));

    app.post(&update, linked).await;
    let leads = app
        .store
        .count("Lead", &[Filter::eq("email_id", "grace@example.com")], &[])
        .await
        .unwrap();
    assert_eq!(leads, 1);

    let (status, body) = app
        .post(
            &update,
            json!({"opportunity_id": opp, "opportunity_from": "Customer", "party_name": "Nobody"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Customer 'Nobody' does not exist");

    seed(&app, "Customer", json!({"customer_name": "Acme"})).await;
    let (status, _) = app
        .post(
            &update,
            json!({"opportunity_id": opp, "opportunity_from": "Customer", "party_name": "Acme"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let stored = app.store.get("Opportunity", &opp).await.unwrap();
    assert_eq!(stored.str_field("opportunity_from"), Some("Customer"));
    assert_eq!(stored.str_field("party_name"), Some("Acme"));
}

#[tokio::test]
async fn lead_source_crud() {
    let app = setup_test_app();
    let create = method_path("lead_source.create_lead_source");
    let (status, body) = app
        .post(&create, json!({"source_name": "Referral", "details": "word of mouth"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Referral");

    let (status, _) = app.post(&create, json!({"source_name": "Referral"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post(&create, json!({"details": "no name"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "source_name is required");

    let (_, body) = app.get(&method_path("lead_source.list_lead_sources")).await;
    assert_eq!(body["total_records"], 1);
    assert_eq!(body["data"][0]["name"], "Referral");

    let (status, body) = app
        .post(
            &method_path("lead_source.update_lead_source"),
            json!({"name": "Referral", "details": "partners"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Lead Source updated successfully");

    let get = format!("{}?name=Referral", method_path("lead_source.get_lead_source"));
    let (status, body) = app.get(&get).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"], "partners");

    let delete = method_path("lead_source.delete_lead_source");
    let (status, _) = app.post(&delete, json!({"name": "Referral"})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.get(&get).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Lead Source with name 'Referral' does not exist");
    let (status, _) = app.post(&delete, json!({"name": "Referral"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn opportunity_to_quotation_to_sales_order() {
    let app = setup_test_app();
    let (_, body) = app
        .post(
            &method_path("opportunity.create_opportunity"),
            json!({
                "opportunity_from": "Customer",
                "party_name": "Acme",
                "status": "Open",
                "company": "Acme Holdings",
                "opportunity_date": "2025-01-10",
                "items": [{"item_code": "PEN", "qty": 2, "rate": 5}],
            }),
        )
        .await;
    let opp = name_of(&body, "opportunity_id");

    let (status, body) = app
        .post(&method_path("opportunity.convert_opportunity_to_quotation"), json!({"opportunity_id": opp}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let quotation = name_of(&body, "quotation");
    let stored = app.store.get("Opportunity", &opp).await.unwrap();
    assert_eq!(stored.str_field("status"), Some("Quotation"));

    let make = method_path("quotation.make_sales_order");
    let (status, body) = app.post(&make, json!({"quotation_name": quotation})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only Submitted quotations can be converted");

    app.post(&method_path("quotation.submit_quotation"), json!({"name": quotation}))
        .await;
    let (status, body) = app
        .post(&make, json!({"quotation_name": quotation, "delivery_date": "2030-02-01"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let order = app.store.get("Sales Order", &name_of(&body, "sales_order")).await.unwrap();
    assert_eq!(order.str_field("customer"), Some("Acme"));
    assert_eq!(order.table("items")[0]["prevdoc_docname"], json!(quotation));
    let stored = app.store.get("Quotation", &quotation).await.unwrap();
    assert_eq!(stored.str_field("status"), Some("Ordered"));
}
