//! Data-driven keyword tables used by the fallback interpreter, the retriever,
//! the scored pruner and the report composer.
//!
//! The built-in defaults describe the mobile-phone decision graph. Every table
//! can be replaced from the `[vocabulary]` section of `config.toml` to point the
//! pipeline at another product domain.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, ShopgraphError};

/// One recognizable user group.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UserGroupRule {
    /// Group name written into `Intent::user_groups`, e.g. `学生`.
    pub name: String,
    /// Substrings of the query that select this group in the fallback parser.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Graph node seeding the traversal for this group. Defaults to `name`.
    #[serde(default)]
    pub node_name: Option<String>,
    /// Needs implied by the group, appended to `Intent::implicit_needs`.
    #[serde(default)]
    pub implicit_needs: Vec<String>,
}

impl UserGroupRule {
    fn new(name: &str, keywords: &[&str], node_name: Option<&str>, implicit_needs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: to_strings(keywords),
            node_name: node_name.map(str::to_string),
            implicit_needs: to_strings(implicit_needs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Product label used when the query does not name one.
    pub product_category: String,
    /// Name of the Decision root node; `{category}` is replaced by the product category.
    pub decision_root: String,
    /// Price pattern; the first capture group is the amount.
    pub price_pattern: String,
    /// Rendering of an extracted price; `{amount}` is replaced by the capture.
    pub price_format: String,
    pub user_groups: Vec<UserGroupRule>,
    /// Explicit-need keywords matched by substring containment.
    pub need_keywords: Vec<String>,
    /// Generic purchase-factor keywords (middle scoring tier).
    pub purchase_factors: Vec<String>,
    /// Categories that are never dropped by the scored pruner.
    pub important_categories: Vec<String>,
    /// Categories rendered in the "core factors" report section.
    pub core_categories: Vec<String>,
    /// Factor names always used as category anchors.
    pub anchor_factors: Vec<String>,
    /// Store relation type -> display label.
    pub relation_labels: BTreeMap<String, String>,
    /// Label for the product -> stage relation of the decision core.
    pub stage_relation_label: String,
    /// Label for the stage -> factor relation of the decision core.
    pub factor_relation_label: String,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let relation_labels = [
            ("INCLUDES", "包含"),
            ("CONTAINS", "涉及"),
            ("RELATES_TO", "关联"),
            ("REQUIRES", "需要"),
            ("KNOWN_FOR", "擅长"),
            ("TYPICALLY_INCLUDES", "通常包含"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            product_category: "手机".to_string(),
            decision_root: "{category}购物决策".to_string(),
            price_pattern: r"(\d+)元".to_string(),
            price_format: "{amount}元左右".to_string(),
            user_groups: vec![
                UserGroupRule::new("学生", &["学生"], Some("学生群体"), &["性价比", "续航"]),
                UserGroupRule::new("老年人", &["老年", "老人"], None, &["大屏", "简单易用"]),
                UserGroupRule::new("游戏玩家", &["游戏"], None, &["性能", "散热"]),
                // Recognized from model output only; no fallback keywords.
                UserGroupRule::new("摄影爱好者", &[], None, &[]),
                UserGroupRule::new("上班族", &[], None, &[]),
                UserGroupRule::new("商务人士", &[], None, &[]),
            ],
            need_keywords: to_strings(&["续航", "拍照", "性能", "大屏", "护眼", "轻薄", "性价比"]),
            purchase_factors: to_strings(&[
                "性能", "价格", "续航", "拍照", "屏幕", "电池", "处理器", "内存", "存储", "外观",
                "品牌", "系统", "网络", "充电", "散热", "音质", "材质", "尺寸",
            ]),
            important_categories: to_strings(&[
                "手机", "性能评估", "价格考虑", "外观设计", "品牌选择", "购买渠道", "明确需求",
                "用户体验", "技术参数",
            ]),
            core_categories: to_strings(&["性能评估", "价格考虑", "外观设计", "品牌选择"]),
            anchor_factors: to_strings(&[
                "品牌知名度", "品牌口碑", "技术实力", "生态系统", "处理器性能", "内存配置",
                "存储容量", "系统优化", "价格区间", "性价比", "优惠活动", "购买时机",
            ]),
            relation_labels,
            stage_relation_label: "需要关注".to_string(),
            factor_relation_label: "涉及".to_string(),
        }
    }
}

impl Vocabulary {
    /// Check that the tables are usable: the price pattern compiles and has a
    /// capture group, and no list that drives ranking is empty.
    pub fn validate(&self) -> Result<()> {
        let re = self.price_regex()?;
        if re.captures_len() < 2 {
            return Err(ShopgraphError::Config(format!(
                "vocabulary.price_pattern needs a capture group: {}",
                self.price_pattern
            )));
        }
        if self.product_category.trim().is_empty() {
            return Err(ShopgraphError::Config(
                "vocabulary.product_category must not be empty".to_string(),
            ));
        }
        if self.purchase_factors.is_empty() {
            return Err(ShopgraphError::Config(
                "vocabulary.purchase_factors must not be empty".to_string(),
            ));
        }
        for rule in &self.user_groups {
            if rule.keywords.iter().any(|k| k.is_empty()) {
                return Err(ShopgraphError::Config(format!(
                    "user group {} has an empty keyword",
                    rule.name
                )));
            }
        }
        Ok(())
    }

    pub fn price_regex(&self) -> Result<Regex> {
        Regex::new(&self.price_pattern).map_err(|e| {
            ShopgraphError::Config(format!("Invalid vocabulary.price_pattern: {}", e))
        })
    }

    pub fn format_price(&self, amount: &str) -> String {
        self.price_format.replace("{amount}", amount)
    }

    pub fn decision_root_name(&self, category: &str) -> String {
        self.decision_root.replace("{category}", category)
    }

    /// Graph node name for a user group; unknown groups map to themselves.
    pub fn canonical_group<'a>(&'a self, group: &'a str) -> &'a str {
        self.user_groups
            .iter()
            .find(|rule| rule.name == group)
            .and_then(|rule| rule.node_name.as_deref())
            .unwrap_or(group)
    }

    /// Translate a store relation type; unknown types pass through.
    pub fn relation_label<'a>(&'a self, relation_type: &'a str) -> &'a str {
        self.relation_labels
            .get(relation_type)
            .map(String::as_str)
            .unwrap_or(relation_type)
    }

    pub fn is_important(&self, category: &str) -> bool {
        self.important_categories.iter().any(|c| c == category)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
