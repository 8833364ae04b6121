//! 预订相关工具：lookup_reservation / get_reservations_by_email / check_cancellation_policy
//!
//! 数据为内置的静态样例。仅凭预订号只返回非敏感信息；价格、支付状态、取消截止时间、
//! 特殊需求须在提供与预订匹配的住客姓名后才会返回。

use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{params_schema, parse_args, Tool, ToolContext, ToolOutcome, ToolRegistry};

pub(crate) struct Reservation {
    pub booking_id: &'static str,
    pub guest_name: &'static str,
    pub email: &'static str,
    pub property_name: &'static str,
    pub check_in: &'static str,
    pub check_out: &'static str,
    pub nights: u32,
    pub room_type: &'static str,
    pub status: &'static str,
    pub total_price: &'static str,
    pub payment_status: &'static str,
    pub cancellation_policy: &'static str,
    pub cancellation_deadline: &'static str,
    pub special_requests: &'static str,
}

pub(crate) const RESERVATIONS: &[Reservation] = &[
    Reservation {
        booking_id: "LS-2024-001",
        guest_name: "Maria Garcia Lopez",
        email: "maria.garcia@example.com",
        property_name: "Gran Via Apartments",
        check_in: "2024-03-15",
        check_out: "2024-04-15",
        nights: 31,
        room_type: "One-bedroom apartment",
        status: "confirmed",
        total_price: "2480.00 EUR",
        payment_status: "paid",
        cancellation_policy: "flexible",
        cancellation_deadline: "2024-03-13T23:59:00Z",
        special_requests: "Late arrival around 23:00",
    },
    Reservation {
        booking_id: "LS-2024-002",
        guest_name: "John Smith",
        email: "john.smith@example.com",
        property_name: "Residencia Salamanca",
        check_in: "2024-02-01",
        check_out: "2024-02-29",
        nights: 28,
        room_type: "Studio",
        status: "checked_in",
        total_price: "1960.00 EUR",
        payment_status: "paid",
        cancellation_policy: "moderate",
        cancellation_deadline: "2024-01-25T23:59:00Z",
        special_requests: "Crib in the room",
    },
    Reservation {
        booking_id: "LS-2024-003",
        guest_name: "Ana Sousa",
        email: "ana.sousa@example.com",
        property_name: "LX Factory Residences",
        check_in: "2024-05-01",
        check_out: "2024-07-01",
        nights: 61,
        room_type: "Two-bedroom apartment",
        status: "pending_payment",
        total_price: "4270.00 EUR",
        payment_status: "pending",
        cancellation_policy: "strict",
        cancellation_deadline: "2024-04-01T23:59:00Z",
        special_requests: "",
    },
];

const CANCELLATION_POLICIES: &[(&str, &str)] = &[
    (
        "flexible",
        "Free cancellation up to 48 hours before check-in. After that, the first night is charged.",
    ),
    (
        "moderate",
        "Free cancellation up to 7 days before check-in. After that, 50% of the stay is charged.",
    ),
    (
        "strict",
        "Free cancellation up to 30 days before check-in. After that, the full stay is non-refundable.",
    ),
];

fn find_reservation(booking_id: &str) -> Option<&'static Reservation> {
    let id = booking_id.trim().to_uppercase();
    RESERVATIONS.iter().find(|r| r.booking_id == id)
}

fn names_match(stored: &str, provided: &str) -> bool {
    let stored = stored.to_lowercase();
    let provided = provided.trim().to_lowercase();
    !provided.is_empty() && (stored.contains(&provided) || provided.contains(&stored))
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(LookupReservationTool);
    registry.register(ReservationsByEmailTool);
    registry.register(CancellationPolicyTool);
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LookupReservationArgs {
    /// 预订号，格式 LS-YYYY-NNN
    booking_id: String,
    /// 住客全名；提供且匹配时返回完整信息
    #[serde(default)]
    guest_name: Option<String>,
}

/// 按预订号查询预订
pub struct LookupReservationTool;

#[async_trait]
impl Tool for LookupReservationTool {
    fn name(&self) -> &str {
        "lookup_reservation"
    }

    fn description(&self) -> &str {
        "Look up a reservation by booking ID (format LS-YYYY-NNN). Without guest_name only non-sensitive \
         info is returned; with a matching guest_name the full details are returned."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<LookupReservationArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: LookupReservationArgs = parse_args(self.name(), args)?;
        let Some(res) = find_reservation(&args.booking_id) else {
            return Ok(ToolOutcome::json(&json!({
                "found": false,
                "message": format!(
                    "No reservation found with ID '{}'. Please verify the booking number.",
                    args.booking_id
                ),
            })));
        };

        let mut info = json!({
            "found": true,
            "booking_id": res.booking_id,
            "property": res.property_name,
            "check_in": res.check_in,
            "check_out": res.check_out,
            "nights": res.nights,
            "room_type": res.room_type,
            "status": res.status,
            "cancellation_policy": res.cancellation_policy,
        });

        let guest_name = args.guest_name.unwrap_or_default();
        if guest_name.trim().is_empty() {
            info["privacy_note"] = json!(
                "Only basic info is shown without identity verification. To access price, payment status \
                 and special requests, ask the guest for their full name."
            );
        } else if !names_match(res.guest_name, &guest_name) {
            return Ok(ToolOutcome::json(&json!({
                "found": true,
                "identity_verified": false,
                "message": "The name provided does not match the name on this reservation. \
                            Please verify your full name and try again.",
            })));
        } else {
            info["identity_verified"] = json!(true);
            info["guest_name"] = json!(res.guest_name);
            info["total_price"] = json!(res.total_price);
            info["payment_status"] = json!(res.payment_status);
            info["cancellation_deadline"] = json!(res.cancellation_deadline);
            info["special_requests"] = json!(res.special_requests);
        }

        let value = serde_json::to_string(&info).map_err(|e| e.to_string())?;
        Ok(ToolOutcome::Update {
            value,
            context: HashMap::from([("booking_id".to_string(), res.booking_id.to_string())]),
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ByEmailArgs {
    /// 预订时使用的邮箱
    email: String,
}

/// 按邮箱找到预订号（只返回基本信息）
pub struct ReservationsByEmailTool;

#[async_trait]
impl Tool for ReservationsByEmailTool {
    fn name(&self) -> &str {
        "get_reservations_by_email"
    }

    fn description(&self) -> &str {
        "Find the booking ID associated with a guest email address. Returns only basic non-sensitive info."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<ByEmailArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: ByEmailArgs = parse_args(self.name(), args)?;
        let email = args.email.trim().to_lowercase();
        let found = RESERVATIONS.iter().find(|r| r.email == email);
        Ok(ToolOutcome::json(&match found {
            None => json!({
                "found": false,
                "message": format!("No reservations found for email '{}'.", args.email),
            }),
            Some(res) => json!({
                "found": true,
                "booking_id": res.booking_id,
                "property": res.property_name,
                "check_in": res.check_in,
                "check_out": res.check_out,
                "status": res.status,
                "note": "Use lookup_reservation with the booking_id and guest_name to access full details.",
            }),
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PolicyArgs {
    booking_id: String,
}

/// 查询取消政策（无需身份验证）
pub struct CancellationPolicyTool;

#[async_trait]
impl Tool for CancellationPolicyTool {
    fn name(&self) -> &str {
        "check_cancellation_policy"
    }

    fn description(&self) -> &str {
        "Get the cancellation policy description for a reservation. No identity verification required."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<PolicyArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: PolicyArgs = parse_args(self.name(), args)?;
        let Some(res) = find_reservation(&args.booking_id) else {
            return Ok(ToolOutcome::json(&json!({
                "found": false,
                "message": format!("Reservation '{}' not found.", args.booking_id),
            })));
        };
        let description = CANCELLATION_POLICIES
            .iter()
            .find(|(name, _)| *name == res.cancellation_policy)
            .map(|(_, d)| *d)
            .unwrap_or("Policy not available.");
        Ok(ToolOutcome::json(&json!({
            "booking_id": res.booking_id,
            "policy_type": res.cancellation_policy,
            "policy_description": description,
            "current_status": res.status,
            "note": "Cancellation deadline is only shown after identity verification.",
        })))
    }
}
