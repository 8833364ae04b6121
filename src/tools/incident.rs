//! 工单工具：lookup_incident / create_incident / escalate_to_human
//!
//! 工单保存在进程内的 IncidentStore（带两条样例数据），重启即丢失。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::{params_schema, parse_args, Tool, ToolContext, ToolOutcome, ToolRegistry};

pub const INCIDENT_CATEGORIES: &[&str] = &[
    "maintenance",
    "noise",
    "cleanliness",
    "appliance",
    "wifi",
    "access",
    "safety",
    "billing",
    "other",
];

const HIGH_PRIORITY: &[&str] = &["maintenance", "safety", "access"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub ticket_id: String,
    pub booking_id: String,
    pub category: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub assigned_to: String,
    pub notes: Option<String>,
}

/// 进程内工单表
#[derive(Debug, Clone, Default)]
pub struct IncidentStore {
    inner: Arc<Mutex<HashMap<String, Incident>>>,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带样例工单 INC-001 / INC-002
    pub fn seeded() -> Self {
        let store = Self::new();
        store.insert(Incident {
            ticket_id: "INC-001".to_string(),
            booking_id: "LS-2024-002".to_string(),
            category: "maintenance".to_string(),
            description: "Hot water not working in bathroom".to_string(),
            status: "in_progress".to_string(),
            priority: "high".to_string(),
            created_at: "2024-02-05T14:30:00Z".to_string(),
            resolved_at: None,
            assigned_to: "Maintenance Team".to_string(),
            notes: Some("Plumber scheduled for tomorrow morning 9-11am".to_string()),
        });
        store.insert(Incident {
            ticket_id: "INC-002".to_string(),
            booking_id: "LS-2024-001".to_string(),
            category: "noise".to_string(),
            description: "Loud neighbors on the floor above".to_string(),
            status: "resolved".to_string(),
            priority: "medium".to_string(),
            created_at: "2024-03-18T22:15:00Z".to_string(),
            resolved_at: Some("2024-03-18T23:00:00Z".to_string()),
            assigned_to: "Property Manager".to_string(),
            notes: Some("Neighbor was spoken to, issue resolved".to_string()),
        });
        store
    }

    pub fn insert(&self, incident: Incident) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(incident.ticket_id.clone(), incident);
        }
    }

    pub fn get(&self, ticket_id: &str) -> Option<Incident> {
        let id = ticket_id.trim().to_uppercase();
        self.inner.lock().ok().and_then(|map| map.get(&id).cloned())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn register(registry: &mut ToolRegistry, store: IncidentStore) {
    registry.register(LookupIncidentTool {
        store: store.clone(),
    });
    registry.register(CreateIncidentTool { store });
    registry.register(EscalateTool);
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LookupArgs {
    /// 工单号，格式 INC-XXX
    ticket_id: String,
}

pub struct LookupIncidentTool {
    store: IncidentStore,
}

#[async_trait]
impl Tool for LookupIncidentTool {
    fn name(&self) -> &str {
        "lookup_incident"
    }

    fn description(&self) -> &str {
        "Look up an existing support ticket by ticket ID (format: INC-XXX)."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<LookupArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: LookupArgs = parse_args(self.name(), args)?;
        Ok(ToolOutcome::json(&match self.store.get(&args.ticket_id) {
            Some(ticket) => {
                let mut v = serde_json::to_value(&ticket).map_err(|e| e.to_string())?;
                v["found"] = json!(true);
                v
            }
            None => json!({
                "found": false,
                "message": format!("Ticket '{}' not found.", args.ticket_id),
            }),
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateArgs {
    /// maintenance, noise, cleanliness, appliance, wifi, access, safety, billing, other
    category: String,
    description: String,
    /// 关联的预订号；缺省时使用会话中已查询过的预订
    #[serde(default)]
    booking_id: Option<String>,
}

pub struct CreateIncidentTool {
    store: IncidentStore,
}

fn normalize_category(raw: &str) -> String {
    let c = raw.trim().to_lowercase();
    if INCIDENT_CATEGORIES.contains(&c.as_str()) {
        c
    } else {
        "other".to_string()
    }
}

#[async_trait]
impl Tool for CreateIncidentTool {
    fn name(&self) -> &str {
        "create_incident"
    }

    fn description(&self) -> &str {
        "Create a new support ticket for an issue. Category must be one of: maintenance, noise, \
         cleanliness, appliance, wifi, access, safety, billing, other."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<CreateArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: CreateArgs = parse_args(self.name(), args)?;
        if args.description.trim().is_empty() {
            return Err("description must not be empty".to_string());
        }
        let booking_id = args
            .booking_id
            .filter(|b| !b.trim().is_empty())
            .or_else(|| ctx.var("booking_id").map(str::to_string))
            .unwrap_or_default();
        let category = normalize_category(&args.category);
        let priority = if HIGH_PRIORITY.contains(&category.as_str()) {
            "high"
        } else {
            "medium"
        };
        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(6)
            .collect();
        let ticket_id = format!("INC-{}", suffix.to_uppercase());

        self.store.insert(Incident {
            ticket_id: ticket_id.clone(),
            booking_id,
            category: category.clone(),
            description: args.description,
            status: "open".to_string(),
            priority: priority.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            resolved_at: None,
            assigned_to: "Support Team".to_string(),
            notes: None,
        });
        tracing::info!(ticket = %ticket_id, category = %category, session = %ctx.session_id, "Incident created");

        Ok(ToolOutcome::json(&json!({
            "created": true,
            "ticket_id": ticket_id,
            "category": category,
            "priority": priority,
            "status": "open",
            "message": format!(
                "Ticket {ticket_id} created successfully. Our support team will contact you within 2 hours. \
                 You will receive an email confirmation."
            ),
        })))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EscalateArgs {
    reason: String,
}

pub struct EscalateTool;

#[async_trait]
impl Tool for EscalateTool {
    fn name(&self) -> &str {
        "escalate_to_human"
    }

    fn description(&self) -> &str {
        "Escalate this conversation to a human agent when the issue cannot be resolved automatically."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<EscalateArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: EscalateArgs = parse_args(self.name(), args)?;
        tracing::warn!(session = %ctx.session_id, reason = %args.reason, "Conversation escalated to a human agent");
        Ok(ToolOutcome::json(&json!({
            "escalated": true,
            "reason": args.reason,
            "message": "Your case has been escalated to a human agent. You will be contacted within the \
                        next 5-10 minutes. We apologize for the inconvenience.",
            "estimated_response_time": "5-10 minutes",
        })))
    }
}
