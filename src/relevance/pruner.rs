use std::collections::HashMap;
use std::sync::Arc;

use super::{score_prune, CategorizedRelations};
use crate::config::PruningConfig;
use crate::error::{Result, ShopgraphError};
use crate::llm::{decode_reply, CompletionClient, CompletionSettings};
use crate::query::Intent;
use crate::vocabulary::Vocabulary;

/// Which path produced a pruned map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneSource {
    Model,
    Scored,
}

#[derive(Debug, Clone)]
pub struct Pruned {
    pub relations: CategorizedRelations,
    pub source: PruneSource,
}

/// Narrows categorized relations to what matters for one query.
pub struct RelevancePruner {
    client: Option<Arc<dyn CompletionClient>>,
    vocabulary: Arc<Vocabulary>,
    limits: PruningConfig,
    settings: CompletionSettings,
}

impl RelevancePruner {
    pub fn new(
        client: Option<Arc<dyn CompletionClient>>,
        vocabulary: Arc<Vocabulary>,
        limits: PruningConfig,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            client,
            vocabulary,
            limits,
            settings,
        }
    }

    /// Prune `categorized`. The result is always a subset of the input and
    /// keeps every important category the input has.
    pub async fn prune(&self, query: &str, categorized: &CategorizedRelations, intent: &Intent) -> Pruned {
        if categorized.is_empty() {
            return Pruned {
                relations: CategorizedRelations::new(),
                source: PruneSource::Scored,
            };
        }

        if let Some(client) = &self.client {
            match self.model_prune(client.as_ref(), query, categorized, intent).await {
                Ok(relations) => {
                    log::info!("Model pruning kept {} categories", relations.len());
                    return Pruned {
                        relations: self.restore_important(relations, categorized),
                        source: PruneSource::Model,
                    };
                }
                Err(e) => log::warn!("Model pruning unusable, using scored pruning: {}", e),
            }
        }

        let relations = score_prune(categorized, intent, &self.vocabulary, &self.limits);
        log::info!(
            "Scored pruning kept {} of {} categories",
            relations.len(),
            categorized.len()
        );
        Pruned {
            relations,
            source: PruneSource::Scored,
        }
    }

    async fn model_prune(
        &self,
        client: &dyn CompletionClient,
        query: &str,
        categorized: &CategorizedRelations,
        intent: &Intent,
    ) -> Result<CategorizedRelations> {
        let summary = categorized.truncated(self.limits.prompt_items);
        let prompt = self.prompt(query, &summary, intent)?;
        let reply = client.complete(&prompt, &self.settings).await?;
        let proposed: HashMap<String, Vec<String>> = decode_reply(&reply)?;

        let accepted = accept_known(&proposed, categorized);
        if accepted.is_empty() {
            return Err(ShopgraphError::Parse(
                "Model kept no item present in the retrieved relations".to_string(),
            ));
        }
        Ok(accepted)
    }

    fn prompt(&self, query: &str, summary: &CategorizedRelations, intent: &Intent) -> Result<String> {
        let factors = serde_json::to_string_pretty(summary)?;
        let category = &self.vocabulary.product_category;
        let core = self.vocabulary.purchase_factors.iter().take(7).cloned().collect::<Vec<_>>().join("、");

        Ok(format!(
            r#"你正在为用户生成{category}购买的深度研究报告，需要从事理图谱中收集全面的信息。请基于以下三个层次的需求来筛选因子：

1. **最相关需求**：与用户明确提到的需求直接匹配
2. **基础需求**：{category}购买决策中的通用重要因子（{core}等）
3. **隐含需求**：基于用户群体和使用场景推断的潜在关注点

用户查询：{query}

解析的用户需求：
- 用户群体：{user_groups:?}
- 明确需求：{explicit_needs:?}
- 隐含需求：{implicit_needs:?}
- 价格范围：{price_range}
- 使用场景：{usage_scenarios:?}

所有相关因子：
{factors}

筛选原则（宽松保留）：
✅ **必须保留**：
- 与明确需求直接相关的因子
- {category}购买的核心决策因子
- 用户群体特征相关的因子
- 使用场景相关的因子

⚠️ **谨慎保留**：
- 与查询有间接关联的因子
- 可能影响购买决策的周边因子

❌ **可以移除**：
- 与{category}购买完全无关的因子
- 过于细节且不影响决策的技术参数

请返回JSON格式，每个类别保留8-12个因子：
{{
    "类别名": ["因子1", "因子2", "...更多因子"]
}}

只能使用上面列出的类别名和因子原文，宁可多保留也不要遗漏重要因子。
"#,
            category = category,
            core = core,
            query = query,
            user_groups = intent.user_groups,
            explicit_needs = intent.explicit_needs,
            implicit_needs = intent.implicit_needs,
            price_range = intent.price_range,
            usage_scenarios = intent.usage_scenarios,
            factors = factors,
        ))
    }

    /// Re-add important categories the model left out, with their first
    /// `important_fallback` items.
    fn restore_important(&self, mut pruned: CategorizedRelations, original: &CategorizedRelations) -> CategorizedRelations {
        for (category, items) in original.iter() {
            if self.vocabulary.is_important(category) && !pruned.contains(category) {
                log::debug!("Restoring important category {}", category);
                let kept = items.iter().take(self.limits.important_fallback).cloned().collect();
                pruned.insert(category, kept);
            }
        }
        pruned
    }
}

/// Keep only items literally present under the same category in `original`,
/// in original category order. Categories left empty are dropped.
fn accept_known(proposed: &HashMap<String, Vec<String>>, original: &CategorizedRelations) -> CategorizedRelations {
    let mut accepted = CategorizedRelations::new();
    for (category, source) in original.iter() {
        let Some(items) = proposed.get(category) else {
            continue;
        };
        let valid: Vec<String> = items.iter().filter(|item| source.contains(*item)).cloned().collect();
        if valid.len() < items.len() {
            log::debug!(
                "Discarded {} unknown items proposed for {}",
                items.len() - valid.len(),
                category
            );
        }
        if !valid.is_empty() {
            accepted.insert(category, valid);
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedClient {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn replying(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, prompt: &str, _settings: &CompletionSettings) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| ShopgraphError::Llm("connection refused".to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn pruner(client: Option<Arc<dyn CompletionClient>>) -> RelevancePruner {
        RelevancePruner::new(
            client,
            Arc::new(Vocabulary::default()),
            PruningConfig::default(),
            CompletionSettings {
                max_tokens: 1000,
                temperature: 0.2,
                timeout: Duration::from_secs(20),
            },
        )
    }

    fn original() -> CategorizedRelations {
        vec![
            (
                "性能评估".to_string(),
                vec!["处理器性能".to_string(), "内存配置".to_string(), "系统优化".to_string()],
            ),
            (
                "价格考虑".to_string(),
                vec!["价格区间".to_string(), "性价比".to_string()],
            ),
            (
                "拍照能力".to_string(),
                vec!["夜景".to_string(), "长焦".to_string()],
            ),
        ]
        .into_iter()
        .collect()
    }

    fn intent() -> Intent {
        Intent {
            product_category: "手机".to_string(),
            explicit_needs: vec!["性能".to_string()],
            ..Intent::default()
        }
    }

    #[tokio::test]
    async fn test_model_items_validated_against_original() {
        let client = ScriptedClient::replying(Some(
            r#"筛选结果：{"性能评估": ["处理器性能", "虚构因子"], "拍照能力": ["长焦"], "新类别": ["夜景"]}"#,
        ));
        let pruned = pruner(Some(client.clone())).prune("性能好的手机", &original(), &intent()).await;

        assert_eq!(pruned.source, PruneSource::Model);
        let relations = &pruned.relations;
        assert_eq!(relations.get("性能评估").unwrap(), ["处理器性能"]);
        assert_eq!(relations.get("拍照能力").unwrap(), ["长焦"]);
        assert!(!relations.contains("新类别"));
        // Important category omitted by the model is restored.
        assert_eq!(relations.get("价格考虑").unwrap(), ["价格区间", "性价比"]);
        assert!(relations.is_subset_of(&original()));

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("性能好的手机"));
        assert!(prompts[0].contains("\"处理器性能\""));
    }

    #[tokio::test]
    async fn test_model_failure_uses_scoring() {
        let client = ScriptedClient::replying(None);
        let pruned = pruner(Some(client)).prune("性能好的手机", &original(), &intent()).await;
        assert_eq!(pruned.source, PruneSource::Scored);
        assert!(pruned.relations.contains("性能评估"));
        assert!(pruned.relations.is_subset_of(&original()));
    }

    #[tokio::test]
    async fn test_model_reply_with_only_unknown_items_uses_scoring() {
        let client = ScriptedClient::replying(Some(r#"{"性能评估": ["不存在"]}"#));
        let pruned = pruner(Some(client)).prune("q", &original(), &intent()).await;
        assert_eq!(pruned.source, PruneSource::Scored);
    }

    #[tokio::test]
    async fn test_malformed_model_reply_uses_scoring() {
        let client = ScriptedClient::replying(Some(r#"{"性能评估": "处理器性能"}"#));
        let pruned = pruner(Some(client)).prune("q", &original(), &intent()).await;
        assert_eq!(pruned.source, PruneSource::Scored);
    }

    #[tokio::test]
    async fn test_no_client_uses_scoring() {
        let pruned = pruner(None).prune("q", &original(), &intent()).await;
        assert_eq!(pruned.source, PruneSource::Scored);
        assert_eq!(pruned.relations.get("性能评估").unwrap()[0], "处理器性能");
    }

    #[tokio::test]
    async fn test_prompt_truncates_long_categories() {
        let client = ScriptedClient::replying(None);
        let long: CategorizedRelations = vec![(
            "技术参数".to_string(),
            (0..20).map(|i| format!("参数{:02}", i)).collect(),
        )]
        .into_iter()
        .collect();
        pruner(Some(client.clone())).prune("q", &long, &intent()).await;
        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("参数14"));
        assert!(!prompts[0].contains("参数15"));
    }

    #[tokio::test]
    async fn test_empty_input_skips_model() {
        let client = ScriptedClient::replying(Some("{}"));
        let pruned = pruner(Some(client.clone())).prune("q", &CategorizedRelations::new(), &intent()).await;
        assert!(pruned.relations.is_empty());
        assert!(client.prompts.lock().unwrap().is_empty());
    }
}
