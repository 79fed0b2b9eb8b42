//! Demo data for local runs.

use crm_core::campaign::{
    AudienceFilter, CallConfig, ConditionConfig, ConditionOperator, CreateCampaignRequest,
    DelayUnit, EmailConfig, SmsConfig, StepKind, WaitConfig,
};
use crm_core::error::CrmResult;
use crm_core::types::{Lead, LeadStatus};
use crm_workflow::WorkflowEngine;
use tracing::info;

const OWNER: &str = "demo-counselor";

/// Seeds three leads and a draft nurture campaign. Returns the campaign id.
pub fn seed(engine: &WorkflowEngine) -> CrmResult<String> {
    let leads = [
        ("demo-lead-1", "Maya", "Patel", "Nursing", Some("+1 555 010 1001"), LeadStatus::New),
        ("demo-lead-2", "Jonas", "Weber", "Computer Science", None, LeadStatus::Contacted),
        ("demo-lead-3", "Lena", "Okafor", "Business", Some("555-010-1003"), LeadStatus::Qualified),
    ];
    for (id, first, last, program, phone, status) in leads {
        let mut lead = Lead::new(id, OWNER);
        lead.first_name = Some(first.to_string());
        lead.last_name = Some(last.to_string());
        lead.email = Some(format!("{}@example.edu", first.to_lowercase()));
        lead.phone = phone.map(str::to_string);
        lead.program = Some(program.to_string());
        lead.status = status;
        engine.store().insert_lead(lead)?;
    }

    let campaign = engine.create_campaign(CreateCampaignRequest {
        name: "Fall intake nurture".into(),
        owner_id: OWNER.into(),
        description: Some("Welcome email, reminder text, and a counselor call".into()),
        audience: AudienceFilter::default(),
        steps: vec![
            StepKind::Email(EmailConfig {
                subject: "Welcome, [First Name]!".into(),
                body: "Thanks for your interest in [Program]. Reply with any questions.".into(),
            }),
            StepKind::Wait(WaitConfig {
                amount: 2,
                unit: DelayUnit::Days,
            }),
            StepKind::Condition(ConditionConfig {
                field: "status".into(),
                operator: ConditionOperator::NotEquals,
                value: serde_json::json!("applied"),
            }),
            StepKind::Sms(SmsConfig {
                body: "Hi [First Name], applications for [Program] close soon.".into(),
            }),
            StepKind::Call(CallConfig::default()),
        ],
    })?;

    info!(campaign_id = %campaign.id, leads = leads.len(), "Demo data seeded");
    Ok(campaign.id)
}
