//! 房源工具：lookup_property / get_property_amenities / get_checkin_info
//!
//! 房源可按 ID（PROP-XXX-NNN）或城市 / 名称别名查找，别名允许部分匹配。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{params_schema, parse_args, Tool, ToolContext, ToolOutcome, ToolRegistry};

const LISTING_BASE_URL: &str = "https://stays.example.com";

struct Property {
    id: &'static str,
    name: &'static str,
    city: &'static str,
    country: &'static str,
    address: &'static str,
    kind: &'static str,
    rating: f32,
    total_reviews: u32,
    check_in_time: &'static str,
    check_out_time: &'static str,
    reception_hours: &'static str,
    self_checkin: Option<&'static str>,
    early_checkin: bool,
    late_checkout: bool,
    amenities: &'static [&'static str],
    aliases: &'static [&'static str],
    slug: &'static str,
}

const PROPERTIES: &[Property] = &[
    Property {
        id: "PROP-BCN-001",
        name: "Gran Via Apartments",
        city: "Barcelona",
        country: "Spain",
        address: "Gran Via de les Corts Catalanes 585, 08011 Barcelona",
        kind: "Serviced apartments",
        rating: 8.7,
        total_reviews: 412,
        check_in_time: "15:00",
        check_out_time: "11:00",
        reception_hours: "08:00-22:00",
        self_checkin: Some("Keypad code sent by email 24 hours before arrival"),
        early_checkin: true,
        late_checkout: true,
        amenities: &[
            "WiFi: available, 300 Mbps, included",
            "Parking: nearby public garage, 25 EUR/day",
            "Laundry: shared washer and dryer",
            "Kitchen: fully equipped with oven, dishwasher, coffee machine",
            "Cleaning: weekly, included",
            "Other: air conditioning, elevator, no pets, no smoking",
        ],
        aliases: &["barcelona", "gran via", "bcn"],
        slug: "barcelona/gran-via",
    },
    Property {
        id: "PROP-MAD-003",
        name: "Residencia Salamanca",
        city: "Madrid",
        country: "Spain",
        address: "Calle de Velazquez 44, 28001 Madrid",
        kind: "Apartment residence",
        rating: 9.1,
        total_reviews: 268,
        check_in_time: "14:00",
        check_out_time: "12:00",
        reception_hours: "24 hours",
        self_checkin: None,
        early_checkin: false,
        late_checkout: true,
        amenities: &[
            "WiFi: available, 600 Mbps, included",
            "Parking: on-site, 20 EUR/day (advance reservation required)",
            "Gym: available (07:00-23:00)",
            "Kitchen: kitchenette with microwave and induction hob",
            "Cleaning: twice a week, included",
            "Other: air conditioning, elevator, pets allowed (small dogs, 15 EUR/night), no smoking",
        ],
        aliases: &["madrid", "salamanca", "residencia salamanca"],
        slug: "madrid/salamanca",
    },
    Property {
        id: "PROP-LIS-002",
        name: "LX Factory Residences",
        city: "Lisbon",
        country: "Portugal",
        address: "Rua Rodrigues de Faria 103, 1300-501 Lisboa",
        kind: "Loft apartments",
        rating: 8.9,
        total_reviews: 157,
        check_in_time: "16:00",
        check_out_time: "10:00",
        reception_hours: "09:00-19:00",
        self_checkin: Some("Smart lock; the access link is sent on the morning of arrival"),
        early_checkin: true,
        late_checkout: false,
        amenities: &[
            "WiFi: available, 500 Mbps, included",
            "Pool: available (seasonal, May to September)",
            "Laundry: in-unit washing machine",
            "Kitchen: fully equipped",
            "Cleaning: every two weeks, included",
            "Other: elevator, no pets, no smoking",
        ],
        aliases: &["lisbon", "lisboa", "lx factory", "lx"],
        slug: "lisbon/lx-factory",
    },
];

fn find_property(name_or_id: &str) -> Option<&'static Property> {
    let key = name_or_id.trim();
    if let Some(p) = PROPERTIES.iter().find(|p| p.id.eq_ignore_ascii_case(key)) {
        return Some(p);
    }
    let lower = key.to_lowercase();
    if lower.is_empty() {
        return None;
    }
    PROPERTIES
        .iter()
        .find(|p| p.aliases.iter().any(|a| *a == lower))
        .or_else(|| {
            PROPERTIES.iter().find(|p| {
                p.aliases
                    .iter()
                    .any(|a| lower.contains(a) || a.contains(lower.as_str()))
            })
        })
}

fn listing_url(p: &Property) -> String {
    format!("{LISTING_BASE_URL}/{}", p.slug)
}

fn not_found(name_or_id: &str) -> ToolOutcome {
    ToolOutcome::json(&json!({
        "found": false,
        "message": format!(
            "Property '{name_or_id}' not found. Available properties are: Barcelona (Gran Via), \
             Madrid (Salamanca), Lisbon (LX Factory)."
        ),
    }))
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(LookupPropertyTool);
    registry.register(AmenitiesTool);
    registry.register(CheckinInfoTool);
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PropertyArgs {
    /// 房源 ID（PROP-XXX-NNN）或城市 / 名称，如 "Madrid"、"Gran Via"
    #[serde(alias = "property_id")]
    name_or_id: String,
}

pub struct LookupPropertyTool;

#[async_trait]
impl Tool for LookupPropertyTool {
    fn name(&self) -> &str {
        "lookup_property"
    }

    fn description(&self) -> &str {
        "Get general information about a property. Accepts a property ID (PROP-XXX-NNN) or a city/name \
         such as 'Barcelona', 'Madrid', 'Lisbon', 'Gran Via', 'Salamanca', 'LX Factory'."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<PropertyArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: PropertyArgs = parse_args(self.name(), args)?;
        let Some(p) = find_property(&args.name_or_id) else {
            return Ok(not_found(&args.name_or_id));
        };
        Ok(ToolOutcome::json(&json!({
            "found": true,
            "property_id": p.id,
            "name": p.name,
            "city": p.city,
            "country": p.country,
            "address": p.address,
            "type": p.kind,
            "check_in_time": p.check_in_time,
            "check_out_time": p.check_out_time,
            "reception_hours": p.reception_hours,
            "self_checkin": p.self_checkin.is_some(),
            "early_checkin_available": p.early_checkin,
            "late_checkout_available": p.late_checkout,
            "rating": p.rating,
            "total_reviews": p.total_reviews,
            "listing_url": listing_url(p),
        })))
    }
}

pub struct AmenitiesTool;

#[async_trait]
impl Tool for AmenitiesTool {
    fn name(&self) -> &str {
        "get_property_amenities"
    }

    fn description(&self) -> &str {
        "Get the full list of amenities for a property. Accepts a property ID or city name."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<PropertyArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: PropertyArgs = parse_args(self.name(), args)?;
        let Some(p) = find_property(&args.name_or_id) else {
            return Ok(not_found(&args.name_or_id));
        };
        Ok(ToolOutcome::json(&json!({
            "found": true,
            "property_name": p.name,
            "amenities_summary": p.amenities,
            "listing_url": listing_url(p),
        })))
    }
}

pub struct CheckinInfoTool;

#[async_trait]
impl Tool for CheckinInfoTool {
    fn name(&self) -> &str {
        "get_checkin_info"
    }

    fn description(&self) -> &str {
        "Get check-in and check-out times and procedures for a property."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<PropertyArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: PropertyArgs = parse_args(self.name(), args)?;
        let Some(p) = find_property(&args.name_or_id) else {
            return Ok(not_found(&args.name_or_id));
        };
        let mut info = json!({
            "found": true,
            "property_name": p.name,
            "check_in_time": p.check_in_time,
            "check_out_time": p.check_out_time,
            "reception_hours": p.reception_hours,
            "early_checkin_available": p.early_checkin,
            "late_checkout_available": p.late_checkout,
            "self_checkin": p.self_checkin.is_some(),
            "listing_url": listing_url(p),
        });
        if let Some(method) = p.self_checkin {
            info["self_checkin_method"] = json!(method);
        }
        Ok(ToolOutcome::json(&info))
    }
}
