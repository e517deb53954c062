//! CRM dashboard: KPI cards and chart series over a creation-date range.

use crate::dates::parse_date;
use crate::error::{AppError, LogFailure};
use crate::extractors::Payload;
use crate::response::success_flat;
use crate::state::AppState;
use crate::store::{AggregateQuery, Bucket, DocumentStore, Filter, GroupBy, Measure};
use axum::{extract::State, response::IntoResponse};
use chrono::{Days, Months, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    /// `day`, `week` or `month` (default).
    pub interval: Option<String>,
    pub company: Option<String>,
    pub sales_person: Option<String>,
}

/// Resolved inputs. Both dates are inclusive.
#[derive(Debug)]
struct Range {
    from: NaiveDate,
    to: NaiveDate,
    interval: String,
    company: Option<String>,
}

impl Range {
    fn resolve(params: &DashboardParams, today: NaiveDate) -> Result<Self, AppError> {
        let date = |field: &str, v: &Option<String>| -> Result<Option<NaiveDate>, AppError> {
            match v.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                None => Ok(None),
                Some(s) => parse_date(s)
                    .map(Some)
                    .ok_or_else(|| AppError::Validation(format!("Invalid {}: {}", field, s))),
            }
        };
        let to = date("to_date", &params.to_date)?.unwrap_or(today);
        let from = match date("from_date", &params.from_date)? {
            Some(d) => d,
            None => to.checked_sub_months(Months::new(3)).unwrap_or(to),
        };
        let interval = match params.interval.as_deref().map(str::trim) {
            Some("day") => "day",
            Some("week") => "week",
            _ => "month",
        };
        Ok(Range {
            from,
            to,
            interval: interval.to_string(),
            company: params.company.clone().filter(|c| !c.trim().is_empty()),
        })
    }

    fn created_within(&self) -> Vec<Filter> {
        let end = self.to.checked_add_days(Days::new(1)).unwrap_or(self.to);
        vec![
            Filter::gte("creation", self.from.to_string()),
            Filter::lt("creation", end.to_string()),
        ]
    }

    fn company_filter(&self) -> Option<Filter> {
        self.company.as_deref().map(|c| Filter::eq("company", c))
    }

    fn group_by(&self) -> GroupBy {
        match self.interval.as_str() {
            "day" => GroupBy::Day,
            "week" => GroupBy::Week,
            _ => GroupBy::Month,
        }
    }
}

fn series(buckets: Vec<Bucket>, measure: &Measure) -> Value {
    buckets
        .into_iter()
        .map(|b| {
            let value = match measure {
                Measure::Count => json!(b.value.round() as i64),
                Measure::Sum(_) => json!(b.value),
            };
            json!({ "label": b.label, "value": value })
        })
        .collect()
}

async fn chart(
    store: &dyn DocumentStore,
    doctype: &str,
    group_by: GroupBy,
    measure: Measure,
    filters: Vec<Filter>,
) -> Result<Value, AppError> {
    let query = AggregateQuery::new(doctype, group_by, measure.clone()).filters(filters);
    Ok(series(store.aggregate(&query).await?, &measure))
}

async fn kpi_cards(store: &dyn DocumentStore, range: &Range) -> Result<Value, AppError> {
    let company: Vec<Filter> = range.company_filter().into_iter().collect();
    let opportunities: Vec<Filter> = range.created_within().into_iter().chain(company.clone()).collect();
    let won: Vec<Filter> = opportunities
        .iter()
        .cloned()
        .chain([Filter::eq("status", "Closed")])
        .collect();
    let open: Vec<Filter> = company
        .into_iter()
        .chain([Filter::not_in("status", vec![json!("Closed"), json!("Lost")])])
        .collect();
    Ok(json!({
        "new_leads": store.count("Lead", &range.created_within(), &[]).await?,
        "new_opportunities": store.count("Opportunity", &opportunities, &[]).await?,
        "won_opportunities": store.count("Opportunity", &won, &[]).await?,
        "open_opportunities": store.count("Opportunity", &open, &[]).await?,
    }))
}

async fn charts(store: &dyn DocumentStore, range: &Range) -> Result<Value, AppError> {
    let closed = || Filter::eq("status", "Closed");
    Ok(json!({
        "incoming_leads": chart(store, "Lead", range.group_by(), Measure::Count, range.created_within()).await?,
        "opportunity_trends": chart(store, "Opportunity", range.group_by(), Measure::Count, range.created_within()).await?,
        "won_opportunities": chart(
            store,
            "Opportunity",
            GroupBy::Month,
            Measure::Count,
            range.created_within().into_iter().chain([closed()]).collect(),
        )
        .await?,
        "territory_opportunity": chart(
            store,
            "Opportunity",
            GroupBy::Field("territory".into()),
            Measure::Count,
            vec![Filter::is_set("territory")],
        )
        .await?,
        "campaign_opportunity": chart(
            store,
            "Opportunity",
            GroupBy::Field("campaign".into()),
            Measure::Count,
            vec![Filter::is_set("campaign")],
        )
        .await?,
        "territory_sales": chart(
            store,
            "Opportunity",
            GroupBy::Field("territory".into()),
            Measure::Sum("opportunity_amount".into()),
            vec![closed()],
        )
        .await?,
        "lead_source": chart(
            store,
            "Lead",
            GroupBy::Field("source".into()),
            Measure::Count,
            vec![Filter::is_set("source")],
        )
        .await?,
    }))
}

pub async fn get_crm_dashboard(
    State(state): State<AppState>,
    Payload(params): Payload<DashboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let range = Range::resolve(&params, Utc::now().date_naive())?;
    let kpis = kpi_cards(state.store(), &range).await.log_failure("dashboard")?;
    let charts = charts(state.store(), &range).await.log_failure("dashboard")?;
    Ok(success_flat(
        json!({
            "filters": {
                "from_date": range.from.to_string(),
                "to_date": range.to.to_string(),
                "company": range.company,
                "sales_person": params.sales_person,
                "interval": range.interval,
            },
            "kpi_cards": kpis,
            "charts": charts,
        }),
        "CRM Dashboard fetched successfully",
    ))
}
