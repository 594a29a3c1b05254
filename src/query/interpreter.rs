use std::sync::Arc;

use regex::Regex;

use super::Intent;
use crate::error::Result;
use crate::llm::{decode_reply, CompletionClient, CompletionSettings};
use crate::vocabulary::Vocabulary;

/// Turns a natural-language query into an `Intent`.
///
/// The model path is tried first when a client is configured; the keyword
/// fallback needs no network and always produces a complete `Intent`.
pub struct QueryInterpreter {
    client: Option<Arc<dyn CompletionClient>>,
    vocabulary: Arc<Vocabulary>,
    settings: CompletionSettings,
    price_re: Regex,
}

impl QueryInterpreter {
    pub fn new(
        client: Option<Arc<dyn CompletionClient>>,
        vocabulary: Arc<Vocabulary>,
        settings: CompletionSettings,
    ) -> Result<Self> {
        let price_re = vocabulary.price_regex()?;
        Ok(Self {
            client,
            vocabulary,
            settings,
            price_re,
        })
    }

    /// Interpret `query`. Never fails: model problems fall back to keywords.
    pub async fn interpret(&self, query: &str) -> Intent {
        if let Some(client) = &self.client {
            match self.model_intent(client.as_ref(), query).await {
                Ok(intent) => {
                    log::info!("Model query parsing succeeded: {:?}", intent);
                    return intent;
                }
                Err(e) => log::warn!("Model query parsing unusable, using keyword fallback: {}", e),
            }
        }
        self.fallback(query)
    }

    async fn model_intent(&self, client: &dyn CompletionClient, query: &str) -> Result<Intent> {
        let reply = client.complete(&self.prompt(query), &self.settings).await?;
        decode_reply(&reply)
    }

    fn prompt(&self, query: &str) -> String {
        let vocab = &self.vocabulary;
        let groups = vocab
            .user_groups
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join("、");
        let needs = vocab.need_keywords.join("、");

        format!(
            r#"请分析以下{category}购买查询，提取关键信息。请返回JSON格式，字段必须完全按照以下格式：

查询：{query}

请返回JSON格式：
{{
    "product_category": "{category}",
    "price_range": "价格范围（如：3000元左右、2000-3000元）",
    "user_groups": ["用户群体列表，如：{groups}"],
    "explicit_needs": ["明确提到的需求，如：{needs}"],
    "implicit_needs": ["可能的隐含需求，基于用户群体推断"],
    "usage_scenarios": ["使用场景，如：办公、学习、游戏、拍照"]
}}

注意：
1. 如果没有相关信息就返回空数组[]或空字符串""
2. 用户群体要准确识别：{groups}
3. 明确需求要从查询中直接提取
4. 隐含需求要合理推断，比如学生关注性价比和续航
5. 必须返回有效的JSON格式
"#,
            category = vocab.product_category,
            query = query,
            groups = groups,
            needs = needs,
        )
    }

    /// Keyword-based parse used when the model path is unavailable.
    pub fn fallback(&self, query: &str) -> Intent {
        let vocab = &self.vocabulary;
        let mut intent = Intent {
            product_category: vocab.product_category.clone(),
            ..Intent::default()
        };

        if let Some(amount) = self.price_re.captures(query).and_then(|c| c.get(1)) {
            intent.price_range = vocab.format_price(amount.as_str());
        }

        for rule in &vocab.user_groups {
            if rule.keywords.iter().any(|k| query.contains(k.as_str())) {
                intent.user_groups.push(rule.name.clone());
                intent.implicit_needs.extend(rule.implicit_needs.iter().cloned());
            }
        }

        intent.explicit_needs = vocab
            .need_keywords
            .iter()
            .filter(|k| query.contains(k.as_str()))
            .cloned()
            .collect();

        log::info!("Keyword fallback parse: {:?}", intent);
        intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShopgraphError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedClient {
        reply: Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(reply: Result<String>) -> Arc<Self> {
            Arc::new(Self { reply, prompts: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, prompt: &str, _settings: &CompletionSettings) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(ShopgraphError::Llm(e.to_string())),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn settings() -> CompletionSettings {
        CompletionSettings {
            max_tokens: 800,
            temperature: 0.1,
            timeout: Duration::from_secs(15),
        }
    }

    fn interpreter(client: Option<Arc<dyn CompletionClient>>) -> QueryInterpreter {
        QueryInterpreter::new(client, Arc::new(Vocabulary::default()), settings()).unwrap()
    }

    #[tokio::test]
    async fn test_student_fallback_parse() {
        let intent = interpreter(None).interpret("学生想要3000元的手机").await;
        assert_eq!(intent.product_category, "手机");
        assert_eq!(intent.price_range, "3000元左右");
        assert_eq!(intent.user_groups, vec!["学生"]);
        assert!(intent.implicit_needs.contains(&"性价比".to_string()));
        assert!(intent.implicit_needs.contains(&"续航".to_string()));
    }

    #[test]
    fn test_fallback_groups_and_needs() {
        let intent = interpreter(None).fallback("给老人买个大屏手机，平时也玩游戏，续航要好");
        assert_eq!(intent.user_groups, vec!["老年人", "游戏玩家"]);
        assert_eq!(intent.implicit_needs, vec!["大屏", "简单易用", "性能", "散热"]);
        assert_eq!(intent.explicit_needs, vec!["续航", "大屏"]);
        assert_eq!(intent.price_range, "");
        assert!(intent.usage_scenarios.is_empty());
    }

    #[test]
    fn test_fallback_on_empty_query() {
        let intent = interpreter(None).fallback("");
        assert_eq!(intent.product_category, "手机");
        assert!(intent.user_groups.is_empty());
        assert!(intent.explicit_needs.is_empty());
    }

    #[tokio::test]
    async fn test_model_intent_used_when_valid() {
        let client = ScriptedClient::new(Ok(r#"```json
{"product_category": "手机", "price_range": "2000-3000元", "user_groups": ["摄影爱好者"],
 "explicit_needs": ["拍照"], "implicit_needs": ["存储"], "usage_scenarios": ["旅行"]}
```"#
            .to_string()));
        let interp = interpreter(Some(client.clone()));
        let intent = interp.interpret("喜欢拍照的预算两三千").await;
        assert_eq!(intent.user_groups, vec!["摄影爱好者"]);
        assert_eq!(intent.usage_scenarios, vec!["旅行"]);

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("喜欢拍照的预算两三千"));
        assert!(prompts[0].contains("usage_scenarios"));
    }

    #[tokio::test]
    async fn test_model_reply_missing_field_falls_back() {
        let client = ScriptedClient::new(Ok(
            r#"{"product_category": "手机", "user_groups": ["学生"]}"#.to_string(),
        ));
        let intent = interpreter(Some(client)).interpret("学生想要3000元的手机").await;
        assert_eq!(intent.price_range, "3000元左右");
        assert!(intent.implicit_needs.contains(&"续航".to_string()));
    }

    #[tokio::test]
    async fn test_model_error_falls_back() {
        let client = ScriptedClient::new(Err(ShopgraphError::Llm("timeout".to_string())));
        let intent = interpreter(Some(client)).interpret("护眼轻薄").await;
        assert_eq!(intent.explicit_needs, vec!["护眼", "轻薄"]);
    }

    #[tokio::test]
    async fn test_model_reply_without_json_falls_back() {
        let client = ScriptedClient::new(Ok("抱歉，我无法回答".to_string()));
        let intent = interpreter(Some(client)).interpret("拍照").await;
        assert_eq!(intent.explicit_needs, vec!["拍照"]);
    }
}
