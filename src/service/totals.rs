//! Item amounts, taxes, discount and grand totals for selling documents, in decimal arithmetic.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Map, Value};

fn decimal(v: Option<&Value>) -> Decimal {
    match v {
        Some(Value::Number(n)) => n
            .to_string()
            .parse::<Decimal>()
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64))
            .unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// Through the decimal string so the f64 is the nearest to the exact value.
fn number(d: Decimal) -> Value {
    d.normalize()
        .to_string()
        .parse::<f64>()
        .map(Value::from)
        .unwrap_or(Value::Null)
}

fn rows_mut<'a>(fields: &'a mut Map<String, Value>, table: &str) -> impl Iterator<Item = &'a mut Map<String, Value>> {
    fields
        .get_mut(table)
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

fn percent_of(base: Decimal, rate: Decimal) -> Decimal {
    (base * rate / dec!(100)).round_dp(2)
}

/// Recompute derived amounts in place for doctypes that carry them; other doctypes are untouched.
pub fn apply_totals(doctype: &str, fields: &mut Map<String, Value>) {
    match doctype {
        "Opportunity" => opportunity_totals(fields),
        "Quotation" | "Sales Order" | "Delivery Note" => selling_totals(fields),
        "Sales Invoice" => {
            selling_totals(fields);
            let grand = fields.get("grand_total").cloned().unwrap_or(Value::Null);
            fields.insert("outstanding_amount".into(), grand);
        }
        _ => {}
    }
}

fn opportunity_totals(fields: &mut Map<String, Value>) {
    let mut sum = Decimal::ZERO;
    let mut any = false;
    for row in rows_mut(fields, "items") {
        let given = decimal(row.get("amount"));
        let amount = if given.is_zero() {
            (decimal(row.get("qty")) * decimal(row.get("rate"))).round_dp(2)
        } else {
            given
        };
        row.insert("amount".into(), number(amount));
        sum += amount;
        any = true;
    }
    if any {
        fields.insert("opportunity_amount".into(), number(sum));
    }
}

fn selling_totals(fields: &mut Map<String, Value>) {
    let mut total_qty = Decimal::ZERO;
    let mut net = Decimal::ZERO;
    for row in rows_mut(fields, "items") {
        let qty = decimal(row.get("qty"));
        let amount = (qty * decimal(row.get("rate"))).round_dp(2);
        row.insert("amount".into(), number(amount));
        total_qty += qty;
        net += amount;
    }

    let mut running = net;
    let mut taxes = Decimal::ZERO;
    for row in rows_mut(fields, "taxes") {
        let tax = match row.get("charge_type").and_then(Value::as_str) {
            Some("Actual") => decimal(row.get("tax_amount")),
            _ => percent_of(net, decimal(row.get("rate"))),
        };
        running += tax;
        taxes += tax;
        row.insert("tax_amount".into(), number(tax));
        row.insert("total".into(), number(running));
    }

    let pct = decimal(fields.get("additional_discount_percentage"));
    let discount = if pct > Decimal::ZERO {
        percent_of(net, pct)
    } else {
        let amount = decimal(fields.get("additional_discount_amount"));
        if amount.is_zero() {
            decimal(fields.get("discount_amount"))
        } else {
            amount
        }
    };

    let grand = (net + taxes - discount).round_dp(2);
    for (key, value) in [
        ("total_qty", total_qty),
        ("total", net),
        ("net_total", net),
        ("total_taxes_and_charges", taxes),
        ("discount_amount", discount),
        ("grand_total", grand),
        ("rounded_total", grand.round()),
    ] {
        fields.insert(key.into(), number(value));
    }
}
