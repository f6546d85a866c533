//! The fixed catalog of document sections.
//!
//! Every run generates exactly these sections, and the assembled document
//! lists them in this order.

use serde::{Deserialize, Serialize};

/// One document section: its key, its position in the document, and the
/// schema instructions handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub key: String,
    pub order: u32,
    pub schema: String,
}

impl SectionSpec {
    pub fn new(key: impl Into<String>, order: u32, schema: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            order,
            schema: schema.into(),
        }
    }
}

/// Keys of the catalog, in assembly order.
pub const SECTION_KEYS: [&str; 19] = [
    "meta",
    "overview",
    "context",
    "evidence",
    "impact",
    "requirements",
    "infrastructure",
    "operations",
    "costs",
    "risks",
    "monitoring",
    "checklist",
    "lifecycle",
    "roles",
    "financial",
    "compliance",
    "visibility",
    "selection",
    "scalability",
];

/// Build the full section catalog, sorted by `order`.
pub fn catalog() -> Vec<SectionSpec> {
    SECTION_KEYS
        .iter()
        .enumerate()
        .map(|(i, key)| SectionSpec::new(*key, i as u32, schema_for(key)))
        .collect()
}

fn schema_for(key: &str) -> &'static str {
    match key {
        "meta" => META,
        "overview" => OVERVIEW,
        "context" => CONTEXT,
        "evidence" => EVIDENCE,
        "impact" => IMPACT,
        "requirements" => REQUIREMENTS,
        "infrastructure" => INFRASTRUCTURE,
        "operations" => OPERATIONS,
        "costs" => COSTS,
        "risks" => RISKS,
        "monitoring" => MONITORING,
        "checklist" => CHECKLIST,
        "lifecycle" => LIFECYCLE,
        "roles" => ROLES,
        "financial" => FINANCIAL,
        "compliance" => COMPLIANCE,
        "visibility" => VISIBILITY,
        "selection" => SELECTION,
        "scalability" => SCALABILITY,
        _ => "",
    }
}

const META: &str = r#"Generate ONLY the "meta" section:

{
  "name": "",
  "short_description": "",
  "category": "",
  "tags": [],
  "status": "active",
  "last_updated": "<ISO timestamp>",
  "images": [],
  "impact_level": 1-5,
  "cost_level": 1-5
}

Rules:
- short_description = max 20-25 words.
- tags = 3-7 lowercase keywords.
- category must match the selected catalog category.
- Do not include any other JSON keys."#;

const OVERVIEW: &str = r#"Generate ONLY the "overview" section:

{
  "description": "",
  "behavioural_primary": "",
  "behavioural_secondary": []
}

Rules:
- description = 2-3 sentences max.
- behavioural_primary = one clear behavioural goal.
- behavioural_secondary = 2-4 supporting behaviours."#;

const CONTEXT: &str = r#"Generate ONLY the "context" section:

{
  "target_users": [],
  "suitable_strong": [],
  "suitable_weak": []
}

Describe conditions precisely: density, land-use patterns, cycling culture,
street design, and public transport integration. Avoid vague labels like "urban".

Rules:
- target_users = specific user groups with meaningful descriptors
- suitable_strong = WHERE and WHY this measure works well (8-15 words per item)
- suitable_weak = conditions that limit effectiveness, with reasoning (8-15 words per item)"#;

const EVIDENCE: &str = r#"Generate ONLY the "evidence" section:

{
  "sweden": [],
  "europe": [],
  "research": [],
  "behavioural": []
}

Rules:
- Each item should be a meaningful insight, not a generic claim
- Reference real mobility patterns and principles
- 1-3 substantive points per field"#;

const IMPACT: &str = r#"Generate ONLY the "impact" section:

{
  "car_ownership_reduction": "",
  "modal_shift": "",
  "parking_reduction": "",
  "satisfaction": "",
  "congestion_reduction": "",
  "long_distance_support": "",
  "other": ""
}

Rules:
- Provide context and reasoning for each impact level
- Use qualitative ranges with explanation when possible
- Connect impacts to specific conditions or user groups"#;

const REQUIREMENTS: &str = r#"Generate ONLY the "requirements" section:

{
  "security": [],
  "infrastructure": [],
  "charging": [],
  "accessibility": [],
  "information": [],
  "quality_standards": []
}

Rules:
- Explain WHAT each requirement consists of
- Describe WHY it matters for implementation
- Provide specific, actionable detail"#;

const INFRASTRUCTURE: &str = r#"Generate ONLY the "infrastructure" section:

{
  "key_requirements": [],
  "power_requirements": [],
  "weather_protection": [],
  "placement_rules": [],
  "notes": ""
}

Rules:
- Describe WHAT the infrastructure consists of physically
- Include relevant dimensions, materials, or technical specs when applicable
- Explain HOW placement or design affects functionality"#;

const OPERATIONS: &str = r#"Generate ONLY the "operations" section:

{
  "developer": [],
  "housing_association": [],
  "mobility_provider": [],
  "city": [],
  "operations_phases": {
    "installation": [],
    "maintenance": [],
    "data_reporting": [],
    "upgrades": []
  }
}

Rules:
- Describe WHAT each actor actually does operationally
- Explain responsibilities with context
- For phases, describe activities with operational or planning detail"#;

const COSTS: &str = r#"Generate ONLY the "costs" section:

{
  "upfront": "",
  "operational": "",
  "benefits": []
}

Rules:
- Use qualitative levels (low/medium/high) with reasoning
- Explain WHAT drives costs
- Describe benefits with specific detail"#;

const RISKS: &str = r#"Generate ONLY the "risks" section:

{
  "risk_1": "",
  "risk_2": "",
  "risk_3": ""
}

Rules:
- Explain the risk mechanism, not just naming it
- Describe impact on implementation or user adoption
- Maximum 3 most significant risks"#;

const MONITORING: &str = r#"Generate ONLY the "monitoring" section:

{
  "metrics": [],
  "frequency": ""
}

Rules:
- 3-6 specific, measurable metrics
- Explain WHAT each metric measures and WHY it matters
- Frequency should include reasoning"#;

const CHECKLIST: &str = r#"Generate ONLY the "checklist" section:

{
  "before_move_in": [],
  "at_move_in": [],
  "after_move_in": []
}

Rules:
- 3-6 steps per phase
- Describe WHAT to verify/do and WHY it matters
- Include context on timing, conditions, or stakeholders involved"#;

const LIFECYCLE: &str = r#"Generate ONLY the "lifecycle" section:

{
  "stage_1_land_allocation": [],
  "stage_2_detailed_planning": [],
  "stage_3_construction": [],
  "stage_4_pre_occupancy": [],
  "stage_5_operation_year_1": [],
  "stage_6_long_term": []
}

Rules:
- 2-5 items per stage
- Describe WHAT happens and WHY it's important at this stage
- Include dependencies, stakeholder coordination, or critical decisions"#;

const ROLES: &str = r#"Generate ONLY the "roles" section:

{
  "developer": { "financial": [], "technical": [], "handover": [] },
  "housing_association": { "financial": [], "operation": [], "issue_resolution": [] },
  "mobility_provider": { "service_level": [], "data": [], "support": [] },
  "city": { "regulation": [], "monitoring": [] }
}

Rules:
- Describe concrete responsibilities with context
- Explain HOW each role contributes to measure success"#;

const FINANCIAL: &str = r#"Generate ONLY the "financial" section:

{
  "cost_distribution": { "developer": [], "mobility_provider": [], "housing_association": [], "city": [] },
  "estimated_costs": { "installation_cost": "", "annual_maintenance": "", "electricity_cost": "" },
  "savings": { "parking_construction_reduction": "", "reduced_need_for_family_car_ownership": "" },
  "incentives": []
}

Rules:
- Use qualitative/semi-quantitative values with explanation
- Explain HOW savings materialize
- incentives: 1-3 items with specific detail on requirements or mechanisms"#;

const COMPLIANCE: &str = r#"Generate ONLY the "compliance" section:

{
  "minimum_requirements": [],
  "documentation_required": [],
  "approval_process": [],
  "non_compliance_actions": []
}

Rules:
- Describe WHAT each requirement ensures
- Detail approval steps with stakeholders involved
- Describe consequences and remediation for non-compliance"#;

const VISIBILITY: &str = r#"Generate ONLY the "visibility" section:

{
  "signage": [],
  "digital": [],
  "physical_touchpoints": []
}

Rules:
- Explain WHAT information each element communicates
- Describe WHERE and WHEN users encounter it"#;

const SELECTION: &str = r#"Generate ONLY the "selection" section:

{
  "requires": [],
  "not_recommended_if": [],
  "recommended_combination": []
}

Rules:
- Describe prerequisites with reasoning
- Explain WHY certain conditions make this unsuitable
- Suggest combinations that enhance effectiveness with explanation"#;

const SCALABILITY: &str = r#"Generate ONLY the "scalability" section:

{
  "conditions_for_expansion": [],
  "extensions": []
}

Rules:
- Describe indicators that would justify expansion
- Explain HOW extensions would build on initial implementation"#;
