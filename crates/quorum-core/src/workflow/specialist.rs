//! Specialist definitions, loaded from YAML (or Markdown with YAML
//! frontmatter) and merged over a built-in roster.
//!
//! ```yaml
//! id: "funding-scout"
//! name: "Funding Scout"
//! description: "Grant and investor research"
//! competencies: ["funding", "grant", "investor"]
//! capabilities: ["crm_query", "ops_intel"]
//! role_reminder: "Cite the funder's published criteria."
//! system_prompt: |
//!   You research funding sources ...
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A bounded-competency specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistDef {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Keywords used to decide whether a task falls within this specialist's area.
    #[serde(default)]
    pub competencies: Vec<String>,

    /// Names of capabilities this specialist may call.
    #[serde(default)]
    pub capabilities: Vec<String>,

    pub system_prompt: String,

    /// Appended to every task sent to the specialist.
    #[serde(default)]
    pub role_reminder: Option<String>,

    #[serde(default)]
    pub default_model: Option<String>,
}

impl SpecialistDef {
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse specialist YAML: {}", e))
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read specialist file '{}': {}", path.display(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse a Markdown file whose YAML frontmatter holds the metadata and
    /// whose body is the system prompt. The id defaults to the file stem.
    pub fn from_markdown(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read specialist markdown '{}': {}", path.display(), e))?;

        let parts: Vec<&str> = content.splitn(3, "---").collect();
        if parts.len() < 3 {
            return Err(format!(
                "Invalid specialist markdown '{}': missing YAML frontmatter",
                path.display()
            ));
        }

        #[derive(Deserialize)]
        struct FrontMatter {
            id: Option<String>,
            name: String,
            description: Option<String>,
            #[serde(default)]
            competencies: Vec<String>,
            #[serde(default)]
            capabilities: Vec<String>,
            role_reminder: Option<String>,
            default_model: Option<String>,
        }

        let fm: FrontMatter = serde_yaml::from_str(parts[1].trim())
            .map_err(|e| format!("Failed to parse frontmatter in '{}': {}", path.display(), e))?;

        let id = fm.id.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        });

        Ok(Self {
            id,
            name: fm.name,
            description: fm.description,
            competencies: fm.competencies,
            capabilities: fm.capabilities,
            system_prompt: parts[2].trim().to_string(),
            role_reminder: fm.role_reminder,
            default_model: fm.default_model,
        })
    }

    /// True when any competency keyword appears in `task` (case-insensitive).
    pub fn covers(&self, task: &str) -> bool {
        let task = task.to_lowercase();
        self.competencies
            .iter()
            .any(|c| !c.is_empty() && task.contains(&c.to_lowercase()))
    }
}

/// Specialists indexed by id.
#[derive(Default)]
pub struct SpecialistLoader {
    pub specialists: HashMap<String, SpecialistDef>,
}

impl SpecialistLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader pre-populated with the built-in roster.
    pub fn with_builtins() -> Self {
        let mut loader = Self::new();
        for def in Self::builtin_specialists() {
            loader.specialists.insert(def.id.clone(), def);
        }
        loader
    }

    /// Load every `.yaml`/`.yml`/`.md` file in `dir`; later files override
    /// earlier entries with the same id.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, String> {
        if !dir.is_dir() {
            return Err(format!("Specialist directory '{}' does not exist", dir.display()));
        }

        let mut entries: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| format!("Failed to read directory '{}': {}", dir.display(), e))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        let mut count = 0;
        for path in entries {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let specialist = match ext {
                "yaml" | "yml" => SpecialistDef::from_file(&path)?,
                "md" => SpecialistDef::from_markdown(&path)?,
                _ => continue,
            };

            tracing::info!(
                "[SpecialistLoader] Loaded specialist: {} ({})",
                specialist.id,
                specialist.name
            );
            self.specialists.insert(specialist.id.clone(), specialist);
            count += 1;
        }

        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<&SpecialistDef> {
        self.specialists.get(id)
    }

    /// All specialists, sorted by id.
    pub fn all(&self) -> Vec<&SpecialistDef> {
        let mut all: Vec<_> = self.specialists.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn builtin_specialists() -> Vec<SpecialistDef> {
        fn def(
            id: &str,
            name: &str,
            description: &str,
            competencies: &[&str],
            capabilities: &[&str],
            system_prompt: &str,
            role_reminder: &str,
        ) -> SpecialistDef {
            SpecialistDef {
                id: id.to_string(),
                name: name.to_string(),
                description: Some(description.to_string()),
                competencies: competencies.iter().map(|s| s.to_string()).collect(),
                capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
                system_prompt: system_prompt.to_string(),
                role_reminder: Some(role_reminder.to_string()),
                default_model: None,
            }
        }

        vec![
            def(
                "funding-scout",
                "Funding Scout",
                "Researches grants, foundations and impact investors; manages the funding pipeline",
                &["funding", "fundrais", "grant", "investor", "donor", "seed round"],
                &["crm_query", "ops_intel"],
                "You are the Funding Scout. Find funding sources aligned with the mission, \
                 qualify them against published criteria, and propose concrete next actions \
                 for the funding pipeline. Never invent deadlines or award amounts.",
                "Name each funder, the fit rationale and the next action.",
            ),
            def(
                "board-recruiter",
                "Board Recruiter",
                "Identifies candidates for the reserved board seats and drafts outreach",
                &["board", "governance", "nominat", "recruit", "candidate"],
                &["crm_query", "ops_intel"],
                "You are the Board Recruiter. Identify candidates for the Disability Advocacy, \
                 Data Ethics and LGBTQ+ Safety seats. Check the existing pipeline first to \
                 avoid duplicate outreach, and flag conflicts of interest.",
                "Check the pipeline before proposing a candidate.",
            ),
            def(
                "research-director",
                "Research Director",
                "Produces literature reviews, policy briefs and research agendas",
                &["research", "literature", "policy", "standard", "paper", "domain"],
                &["ops_intel"],
                "You are the Research Director. Produce rigorous, citable analysis mapped to \
                 the sensory safety, kinetic equity and algorithmic accountability domains. \
                 Separate established findings from open questions.",
                "Cite sources; never fabricate statistics.",
            ),
            def(
                "seo-strategist",
                "SEO Strategist",
                "Keyword strategy, content gap analysis and search positioning",
                &["seo", "search", "keyword", "visibility", "ranking"],
                &["ops_intel"],
                "You are the SEO Strategist. Own the search landscape for the foundation's \
                 domains: keyword clusters, content gaps and on-page improvements, each with \
                 a measurable target.",
                "Tie every recommendation to a keyword cluster.",
            ),
            def(
                "content-manager",
                "Content Manager",
                "Plans and drafts website content for human review",
                &["content", "blog", "post", "article", "editorial", "publish"],
                &["ops_intel"],
                "You are the Content Manager. Plan and draft posts in an authoritative, \
                 evidence-based voice. All drafts go to human review before publishing.",
                "Drafts only; never publish directly.",
            ),
        ]
    }
}
