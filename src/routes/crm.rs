//! RPC routes: `/api/method/crm_api.<module>.<function>`.

use crate::handlers::{
    dashboard, delivery_note, events, item, lead, lead_source, masters, opportunity, quotation, sales_invoice,
    sales_order, users,
};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

fn method(path: &str) -> String {
    format!("/api/method/crm_api.{}", path)
}

pub fn crm_routes(state: AppState) -> Router {
    Router::new()
        // lead
        .route(&method("lead.create_lead"), post(lead::create_lead))
        .route(&method("lead.list_leads"), get(lead::list_leads))
        .route(&method("lead.update_lead"), post(lead::update_lead))
        .route(&method("lead.delete_lead"), post(lead::delete_lead))
        .route(&method("lead.get_lead_by_id"), get(lead::get_lead_by_id).post(lead::get_lead_by_id))
        .route(&method("lead.convert_lead_to_opportunity"), post(lead::convert_lead_to_opportunity))
        // opportunity
        .route(&method("opportunity.create_opportunity"), post(opportunity::create_opportunity))
        .route(&method("opportunity.list_opportunity"), get(opportunity::list_opportunity))
        .route(
            &method("opportunity.get_opportunity_by_id"),
            get(opportunity::get_opportunity_by_id).post(opportunity::get_opportunity_by_id),
        )
        .route(&method("opportunity.update_opportunity"), post(opportunity::update_opportunity))
        .route(&method("opportunity.delete_opportunity"), post(opportunity::delete_opportunity))
        .route(
            &method("opportunity.convert_opportunity_to_quotation"),
            post(opportunity::convert_opportunity_to_quotation),
        )
        // quotation
        .route(&method("quotation.create_quotation"), post(quotation::create_quotation))
        .route(&method("quotation.update_quotation"), post(quotation::update_quotation))
        .route(&method("quotation.submit_quotation"), post(quotation::submit_quotation))
        .route(&method("quotation.cancel_quotation"), post(quotation::cancel_quotation))
        .route(&method("quotation.delete_quotation"), post(quotation::delete_quotation))
        .route(&method("quotation.list_quotation"), get(quotation::list_quotation))
        .route(
            &method("quotation.get_quotation_by_id"),
            get(quotation::get_quotation_by_id).post(quotation::get_quotation_by_id),
        )
        .route(&method("quotation.make_sales_order"), post(quotation::make_sales_order))
        // sales_order
        .route(&method("sales_order.create_sales_order"), post(sales_order::create_sales_order))
        .route(
            &method("sales_order.update_sales_order"),
            post(sales_order::update_sales_order).put(sales_order::update_sales_order),
        )
        .route(&method("sales_order.list_sales_orders"), get(sales_order::list_sales_orders))
        .route(&method("sales_order.delete_sales_order"), delete(sales_order::delete_sales_order))
        .route(&method("sales_order.submit_sales_order"), post(sales_order::submit_sales_order))
        .route(&method("sales_order.cancel_sales_order"), post(sales_order::cancel_sales_order))
        .route(&method("sales_order.get_sales_order_by_id"), get(sales_order::get_sales_order_by_id))
        .route(&method("sales_order.make_delivery_note"), post(sales_order::make_delivery_note))
        .route(&method("sales_order.make_sales_invoice"), post(sales_order::make_sales_invoice))
        // delivery_note
        .route(&method("delivery_note.create_delivery_note"), post(delivery_note::create_delivery_note))
        .route(&method("delivery_note.list_delivery_notes"), get(delivery_note::list_delivery_notes))
        .route(
            &method("delivery_note.delete_delivery_note"),
            delete(delivery_note::delete_delivery_note).post(delivery_note::delete_delivery_note),
        )
        .route(
            &method("delivery_note.update_delivery_note"),
            post(delivery_note::update_delivery_note).put(delivery_note::update_delivery_note),
        )
        .route(&method("delivery_note.submit_delivery_note"), post(delivery_note::submit_delivery_note))
        .route(&method("delivery_note.cancel_delivery_note"), post(delivery_note::cancel_delivery_note))
        // sales_invoice
        .route(&method("sales_invoice.create_sales_invoice"), post(sales_invoice::create_sales_invoice))
        .route(&method("sales_invoice.list_sales_invoices"), get(sales_invoice::list_sales_invoices))
        .route(&method("sales_invoice.update_sales_invoice"), post(sales_invoice::update_sales_invoice))
        .route(&method("sales_invoice.delete_sales_invoice"), delete(sales_invoice::delete_sales_invoice))
        .route(&method("sales_invoice.get_sales_invoice_by_id"), get(sales_invoice::get_sales_invoice_by_id))
        // masters
        .route(&method("masters.list_customers"), get(masters::list_customers))
        .route(&method("masters.get_company_list"), get(masters::get_company_list))
        .route(&method("masters.get_territory_list"), get(masters::get_territory_list))
        .route(&method("masters.get_industry_list"), get(masters::get_industry_list))
        .route(&method("masters.get_country_list"), get(masters::get_country_list))
        .route(&method("masters.get_language_list"), get(masters::get_language_list))
        .route(&method("masters.get_gender_list"), get(masters::get_gender_list))
        .route(&method("masters.get_campaign_list"), get(masters::get_campaign_list))
        .route(&method("masters.get_customer_groups"), get(masters::get_customer_groups))
        .route(&method("masters.get_market_segment_list"), get(masters::get_market_segment_list))
        .route(&method("masters.get_sales_stage_list"), get(masters::get_sales_stage_list))
        .route(&method("masters.get_opportunity_type_list"), get(masters::get_opportunity_type_list))
        .route(&method("masters.get_crm_master_list"), get(masters::get_crm_master_list))
        // lead_source
        .route(&method("lead_source.create_lead_source"), post(lead_source::create_lead_source))
        .route(&method("lead_source.list_lead_sources"), get(lead_source::list_lead_sources))
        .route(&method("lead_source.get_lead_source"), get(lead_source::get_lead_source))
        .route(&method("lead_source.update_lead_source"), post(lead_source::update_lead_source))
        .route(&method("lead_source.delete_lead_source"), post(lead_source::delete_lead_source))
        // item
        .route(&method("item.create_item"), post(item::create_item))
        .route(&method("item.list_items"), get(item::list_items))
        .route(&method("item.update_item"), post(item::update_item).put(item::update_item))
        .route(&method("item.delete_item"), delete(item::delete_item))
        // dashboard
        .route(&method("dashboard.get_crm_dashboard"), get(dashboard::get_crm_dashboard))
        // events
        .route(&method("events.get_event_assignments"), get(events::get_event_assignments))
        .route(&method("events.create_event_from_lead"), post(events::create_event_from_lead))
        .route(&method("events.send_event_assignment_email"), post(events::send_event_assignment_email))
        .route(&method("events.reschedule_event"), post(events::reschedule_event))
        // users
        .route(&method("users.get_full_user_list"), get(users::get_full_user_list))
        .with_state(state)
}
