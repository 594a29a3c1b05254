//! Tiered text report over pruned relations.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::query::Intent;
use crate::relevance::CategorizedRelations;
use crate::vocabulary::Vocabulary;

const GROUP_ITEMS: usize = 8;
const NEED_CATEGORIES: usize = 3;
const NEED_ITEMS: usize = 6;
const CORE_ITEMS: usize = 10;
const PERIPHERAL_CATEGORIES: usize = 5;
const PERIPHERAL_ITEMS: usize = 8;

#[derive(Serialize)]
struct StructuredEcho<'a> {
    query: &'a str,
    analysis_layers: AnalysisLayers<'a>,
    relevant_aspects: &'a CategorizedRelations,
}

#[derive(Serialize)]
struct AnalysisLayers<'a> {
    most_relevant: MostRelevant<'a>,
    core_factors: &'a [String],
    implicit_factors: Vec<&'a str>,
}

#[derive(Serialize)]
struct MostRelevant<'a> {
    user_groups: &'a [String],
    explicit_needs: &'a [String],
}

/// Renders the final report. Performs no filtering of its own: a category
/// may show up in more than one section.
pub struct ReportComposer {
    vocabulary: Arc<Vocabulary>,
}

impl ReportComposer {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self { vocabulary }
    }

    pub fn compose(&self, query: &str, pruned: &CategorizedRelations, intent: &Intent) -> Result<String> {
        let vocab = &self.vocabulary;
        let product = vocab.product_category.as_str();
        let mut lines: Vec<String> = Vec::new();

        lines.push(format!("# {}购买深度研究报告", product));
        lines.push(format!("**查询**: {}", query));

        lines.push("\n## 🎯 最相关需求匹配".to_string());

        let mut shown_groups: Vec<&str> = Vec::new();
        for group in &intent.user_groups {
            let Some((category, items)) = self.group_category(group, pruned) else {
                continue;
            };
            shown_groups.push(category);
            if items.is_empty() {
                continue;
            }
            lines.push(format!("\n**{}群体关注点**:", group));
            lines.extend(items.iter().take(GROUP_ITEMS).map(|item| format!("• {}", item)));
        }

        for need in &intent.explicit_needs {
            let related: Vec<(&str, &[String])> = pruned
                .iter()
                .filter(|(category, items)| {
                    category.contains(need.as_str()) || items.iter().any(|i| i.contains(need.as_str()))
                })
                .take(NEED_CATEGORIES)
                .collect();
            if related.is_empty() {
                continue;
            }
            lines.push(format!("\n**{}需求相关**:", need));
            for (category, items) in related {
                let listed: Vec<&str> = items.iter().take(NEED_ITEMS).map(String::as_str).collect();
                lines.push(format!("  - {}: {}", category, listed.join(", ")));
            }
        }

        lines.push("\n## 📊 核心购买决策因子".to_string());
        for category in &vocab.core_categories {
            match pruned.get(category) {
                Some(items) if !items.is_empty() => {
                    lines.push(format!("\n**{}**:", category));
                    lines.extend(items.iter().take(CORE_ITEMS).map(|item| format!("• {}", item)));
                }
                _ => {}
            }
        }

        lines.push("\n## 💡 隐含需求和周边考虑".to_string());
        let peripheral: Vec<&str> = pruned
            .categories()
            .filter(|c| {
                !vocab.core_categories.iter().any(|core| core == c)
                    && !shown_groups.contains(c)
                    && *c != product
            })
            .take(PERIPHERAL_CATEGORIES)
            .collect();
        for category in &peripheral {
            let items = pruned.get(category).unwrap_or_default();
            if items.is_empty() {
                continue;
            }
            lines.push(format!("\n**{}**:", category));
            lines.extend(items.iter().take(PERIPHERAL_ITEMS).map(|item| format!("• {}", item)));
        }

        let echo = StructuredEcho {
            query,
            analysis_layers: AnalysisLayers {
                most_relevant: MostRelevant {
                    user_groups: &intent.user_groups,
                    explicit_needs: &intent.explicit_needs,
                },
                core_factors: &vocab.core_categories,
                implicit_factors: peripheral,
            },
            relevant_aspects: pruned,
        };

        lines.push("\n## 📋 完整关系数据".to_string());
        lines.push("```json".to_string());
        lines.push(serde_json::to_string_pretty(&echo)?);
        lines.push("```".to_string());

        Ok(lines.join("\n"))
    }

    /// Category holding a user group's items: the group name itself, else
    /// its canonical graph node name.
    fn group_category<'a>(&self, group: &'a str, pruned: &'a CategorizedRelations) -> Option<(&'a str, &'a [String])> {
        if let Some(items) = pruned.get(group) {
            return Some((group, items));
        }
        let canonical = self.vocabulary.canonical_group(group);
        pruned.iter().find(|(category, _)| *category == canonical)
    }
}
