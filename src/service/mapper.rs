//! Builds the field map of a follow-on document from its source
//! (Lead to Opportunity, Opportunity to Quotation, Quotation to Sales Order,
//! Sales Order to Delivery Note and Sales Invoice).

use super::lifecycle::require_submitted;
use crate::error::AppError;
use crate::store::Document;
use chrono::NaiveDate;
use serde_json::{Map, Value};

const PARTY_CONTEXT: &[&str] = &["company", "currency", "territory", "source", "campaign"];
const PRICING: &[&str] = &["selling_price_list", "conversion_rate", "price_list_currency"];

fn copy(src: &Document, keys: &[&str], into: &mut Map<String, Value>) {
    for key in keys {
        if let Some(v) = src.fields.get(*key).filter(|v| !v.is_null()) {
            into.insert((*key).to_string(), v.clone());
        }
    }
}

/// Copies `keys` from each row of `table` and stamps `link` on every copied row.
fn copy_rows(src: &Document, table: &str, keys: &[&str], link: Option<(&str, &str)>) -> Value {
    let rows = src
        .table(table)
        .iter()
        .filter_map(Value::as_object)
        .map(|row| {
            let mut out: Map<String, Value> = keys
                .iter()
                .filter_map(|k| row.get(*k).map(|v| ((*k).to_string(), v.clone())))
                .collect();
            if let Some((field, name)) = link {
                out.insert(field.to_string(), Value::String(name.to_string()));
            }
            Value::Object(out)
        })
        .collect();
    Value::Array(rows)
}

fn date(d: NaiveDate) -> Value {
    Value::String(d.format("%Y-%m-%d").to_string())
}

fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn lead_to_opportunity(lead: &Document, today: NaiveDate) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("opportunity_from".into(), text("Lead"));
    out.insert("party_name".into(), text(&lead.name));
    out.insert("status".into(), text("Open"));
    out.insert("transaction_date".into(), date(today));
    copy(
        lead,
        &[
            "company", "source", "territory", "industry", "market_segment", "city", "state", "country", "website",
            "no_of_employees", "annual_revenue",
        ],
        &mut out,
    );
    for (from, to) in [
        ("email_id", "contact_email"),
        ("mobile_no", "contact_mobile"),
        ("whatsapp_no", "whatsapp"),
        ("phone", "phone"),
        ("campaign_name", "campaign"),
        ("company_name", "customer_name"),
    ] {
        if let Some(v) = lead.fields.get(from).filter(|v| !v.is_null()) {
            out.insert(to.into(), v.clone());
        }
    }
    out
}

pub fn opportunity_to_quotation(opp: &Document, today: NaiveDate) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert(
        "quotation_to".into(),
        opp.fields.get("opportunity_from").cloned().unwrap_or_else(|| text("Customer")),
    );
    if let Some(party) = opp.fields.get("party_name") {
        out.insert("party_name".into(), party.clone());
    }
    out.insert("opportunity".into(), text(&opp.name));
    out.insert("transaction_date".into(), date(today));
    out.insert("status".into(), text("Draft"));
    copy(opp, PARTY_CONTEXT, &mut out);
    if let Some(rate) = opp.fields.get("exchange_rate") {
        out.insert("conversion_rate".into(), rate.clone());
    }
    out.insert(
        "items".into(),
        copy_rows(opp, "items", &["item_code", "qty", "rate"], Some(("prevdoc_docname", &opp.name))),
    );
    out
}

pub fn quotation_to_sales_order(
    quotation: &Document,
    today: NaiveDate,
    delivery_date: Option<&str>,
) -> Result<Map<String, Value>, AppError> {
    require_submitted(quotation, "converted")?;
    if quotation.str_field("quotation_to") != Some("Customer") {
        return Err(AppError::Validation(
            "Sales Orders can only be made from Customer quotations".into(),
        ));
    }
    let mut out = Map::new();
    if let Some(party) = quotation.fields.get("party_name") {
        out.insert("customer".into(), party.clone());
    }
    out.insert("transaction_date".into(), date(today));
    if let Some(d) = delivery_date {
        out.insert("delivery_date".into(), text(d));
    }
    out.insert("order_type".into(), quotation.fields.get("order_type").cloned().unwrap_or_else(|| text("Sales")));
    copy(quotation, PARTY_CONTEXT, &mut out);
    copy(quotation, PRICING, &mut out);
    out.insert(
        "items".into(),
        copy_rows(
            quotation,
            "items",
            &["item_code", "item_name", "qty", "rate", "uom", "warehouse", "delivery_date"],
            Some(("prevdoc_docname", &quotation.name)),
        ),
    );
    out.insert(
        "taxes".into(),
        copy_rows(quotation, "taxes", &["charge_type", "account_head", "rate", "tax_amount"], None),
    );
    Ok(out)
}

fn from_sales_order(so: &Document, action: &str) -> Result<Map<String, Value>, AppError> {
    require_submitted(so, action)?;
    let mut out = Map::new();
    copy(so, &["customer", "set_warehouse", "project", "cost_center"], &mut out);
    copy(so, PARTY_CONTEXT, &mut out);
    copy(so, PRICING, &mut out);
    out.insert(
        "taxes".into(),
        copy_rows(so, "taxes", &["charge_type", "account_head", "rate", "tax_amount"], None),
    );
    Ok(out)
}

pub fn sales_order_to_delivery_note(so: &Document, today: NaiveDate) -> Result<Map<String, Value>, AppError> {
    let mut out = from_sales_order(so, "delivered")?;
    out.insert("posting_date".into(), date(today));
    out.insert(
        "items".into(),
        copy_rows(
            so,
            "items",
            &["item_code", "item_name", "qty", "rate", "uom", "warehouse"],
            Some(("against_sales_order", &so.name)),
        ),
    );
    Ok(out)
}

pub fn sales_order_to_sales_invoice(so: &Document, today: NaiveDate) -> Result<Map<String, Value>, AppError> {
    let mut out = from_sales_order(so, "billed")?;
    out.insert("posting_date".into(), date(today));
    let due = so
        .table("payment_schedule")
        .first()
        .and_then(|p| p.get("due_date"))
        .cloned()
        .unwrap_or_else(|| date(today));
    out.insert("due_date".into(), due);
    out.insert(
        "items".into(),
        copy_rows(
            so,
            "items",
            &["item_code", "item_name", "qty", "rate", "uom", "warehouse", "delivery_date"],
            Some(("sales_order", &so.name)),
        ),
    );
    Ok(out)
}
