use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::error::PromptError;
use crate::models::{Category, GenerationInput};

/// Text substituted for an empty reference set
pub const NO_REFERENCES: &str = "（暂无同品类参考脚本）";

/// A named instruction template with `{placeholder}` slots.
///
/// `{{` and `}}` render literal braces. Substitution is single-pass, so
/// supplied values are inserted verbatim and never re-scanned.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub template: &'static str,
}

impl PromptTemplate {
    /// Render the template. Every placeholder must have a value.
    pub fn format(&self, values: &[(&str, &str)]) -> Result<String, PromptError> {
        render(self.name, self.template, values)
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> Vec<&'static str> {
        placeholders(self.template)
    }
}

/// Render `template` against `values`
pub fn render(name: &str, template: &str, values: &[(&str, &str)]) -> Result<String, PromptError> {
    let mut output = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;
    let mut offset = 0;

    while let Some(pos) = rest.find(['{', '}']) {
        output.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            output.push('{');
            rest = &tail[2..];
            offset += pos + 2;
        } else if tail.starts_with("}}") {
            output.push('}');
            rest = &tail[2..];
            offset += pos + 2;
        } else if tail.starts_with('}') {
            output.push('}');
            rest = &tail[1..];
            offset += pos + 1;
        } else {
            let close = tail.find('}').ok_or_else(|| PromptError::UnclosedPlaceholder {
                template: name.to_string(),
                offset: offset + pos,
            })?;
            let key = &tail[1..close];
            let value = values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .ok_or_else(|| PromptError::MissingValue {
                    template: name.to_string(),
                    placeholder: key.to_string(),
                })?;
            output.push_str(value);
            rest = &tail[close + 1..];
            offset += pos + close + 1;
        }
    }

    output.push_str(rest);
    Ok(output)
}

fn placeholders(template: &'static str) -> Vec<&'static str> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        let tail = &rest[pos..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            rest = &tail[1..];
        } else if let Some(close) = tail.find('}') {
            let key = &tail[1..close];
            if !names.contains(&key) {
                names.push(key);
            }
            rest = &tail[close + 1..];
        } else {
            break;
        }
    }

    names
}

pub const AUTO_TAGGING_PROMPT: PromptTemplate = PromptTemplate {
    name: "auto_tagging",
    description: "广告文案自动打标",
    template: r#"你是一名资深的游戏广告数据分析师。
请把下面这段非结构化的广告文案整理成结构化元数据。

## 输入文案
{raw_content}

## 提取字段
只输出一个 JSON 对象，不要输出任何解释性文字：

1. **subject_name**: 推测的游戏名称（无法推测时填"未知"）
2. **category**: 游戏核心品类，只能从以下取值中选择: SLG, MMO, 卡牌, 休闲, 二次元, 模拟经营, 射击, 传奇, 其他
3. **tags**: 文案涉及的具体玩法标签列表（如 "抽卡", "攻城", "合成"），最多 3 个
4. **hook**: 前 3 秒的吸睛手段（如 "福利诱惑", "巨大反差", "失败展示"）
5. **style**: 文案暗示的画面风格
6. **summary**: 一句话概括核心剧情

## 输出示例
{{
    "subject_name": "万国觉醒",
    "category": "SLG",
    "tags": ["多文明混战", "行军策略"],
    "hook": "巨大反差",
    "style": "美式卡通",
    "summary": "曹操跨时空对决凯撒，展示多文明策略玩法。"
}}"#,
};

pub const DRAFT_PROMPT: PromptTemplate = PromptTemplate {
    name: "draft",
    description: "脚本初稿生成",
    template: r#"你是一位擅长信息流广告的游戏创意专家。

## 任务
根据下面的游戏信息创作一条信息流广告脚本，以三栏表格输出。

## 游戏信息
- **游戏介绍：** {game_intro}
- **独特卖点（USP）：** {usp}
- **目标人群：** {target_audience}
- **游戏品类：** {category}

## 参考脚本
{references}

## 创作要求
1. 前 3 秒必须抓住注意力（悬念、冲突或利益点）
2. USP 必须清晰传达
3. 风格贴合目标人群
4. 每个分镜都有明确目的，节奏紧凑
5. 结尾给出明确的转化引导

## 输出格式
| 分镜 | 口播 | 设计意图 |
|------|------|----------|
| 画面描述 | 配音文案 | 创意目的 |

单元格只写纯文本，不要使用 HTML 标签，需要换行时用分号（；）分隔。
请输出 5-8 个分镜，总时长 15-30 秒。"#,
};

pub const SLG_DRAFT_PROMPT: PromptTemplate = PromptTemplate {
    name: "draft_slg",
    description: "SLG 品类脚本初稿",
    template: r#"你是一位专注 SLG（策略类）游戏的广告创意专家。

## 游戏信息
- **游戏介绍：** {game_intro}
- **独特卖点（USP）：** {usp}
- **目标人群：** {target_audience}

## SLG 创作要点
1. 展示策略深度与智力挑战
2. 强调征服与称霸的成就感
3. 突出联盟、国战等社交玩法
4. 展示势力与数值成长
5. 营造史诗感的世界观

## 参考脚本
{references}

## 输出格式
| 分镜 | 口播 | 设计意图 |
|------|------|----------|
| 画面描述 | 配音文案 | 创意目的 |

请输出 5-8 个分镜的完整脚本。"#,
};

pub const MMO_DRAFT_PROMPT: PromptTemplate = PromptTemplate {
    name: "draft_mmo",
    description: "MMO 品类脚本初稿",
    template: r#"你是一位专注 MMO（大型多人在线）游戏的广告创意专家。

## 游戏信息
- **游戏介绍：** {game_intro}
- **独特卖点（USP）：** {usp}
- **目标人群：** {target_audience}

## MMO 创作要点
1. 组队、公会等社交乐趣
2. 角色成长、转职与装备
3. 广阔的世界与丰富内容
4. 爽快的战斗与技能特效
5. 归属感与情感共鸣

## 参考脚本
{references}

## 输出格式
| 分镜 | 口播 | 设计意图 |
|------|------|----------|
| 画面描述 | 配音文案 | 创意目的 |

请输出 5-8 个分镜的完整脚本。"#,
};

pub const CASUAL_DRAFT_PROMPT: PromptTemplate = PromptTemplate {
    name: "draft_casual",
    description: "休闲品类脚本初稿",
    template: r#"你是一位专注休闲游戏的广告创意专家。

## 游戏信息
- **游戏介绍：** {game_intro}
- **独特卖点（USP）：** {usp}
- **目标人群：** {target_audience}

## 休闲游戏创作要点
1. 简单易上手
2. 解压放松
3. 即时满足的成就感
4. 碎片时间随时可玩
5. 有趣的创意玩法

## 参考脚本
{references}

## 输出格式
| 分镜 | 口播 | 设计意图 |
|------|------|----------|
| 画面描述 | 配音文案 | 创意目的 |

请输出 5-8 个分镜的完整脚本。"#,
};

pub const REVIEW_PROMPT: PromptTemplate = PromptTemplate {
    name: "review",
    description: "三角色评审委员会",
    template: r#"你是【游戏广告评审委员会】的主席，委员会由三位资深专家组成。
请综合三方视角，以【市场高转化标准】为依据，对待评审脚本进行严格评审。

## 1. 输入信息
- **游戏介绍：** {game_intro}
- **独特卖点 (USP)：** {usp}
- **目标人群：** {target_audience}
- **游戏品类：** {category}

## 2. 评审依据：市场高转化标准
以下是同品类高转化广告的共同特征，请逐条核对脚本：
{rag_traits}

## 3. 待评审脚本
{script}

## 4. 委员会分角评审
请依次以三位专家的口吻评审：

### 角色 A：资深投放投手 (User Acquisition Specialist)
* **关注点**：黄金前 3 秒吸睛度、无效镜头、CTA 诱惑力
* **判词**：指出浪费预算的镜头

### 角色 B：硬核玩家 (Hardcore Gamer)
* **关注点**：真实性、术语准确性、爽点还原度
* **判词**：指出让玩家出戏的台词

### 角色 C：产品经理 (Product Manager)
* **关注点**：USP ({usp}) 传达是否清晰、人群是否匹配
* **判词**：评估卖点是否被剧情淹没

## 5. 主席总结
汇总专家意见，给出恰好 3 条最高优先级的修改建议，每条格式如下：
1. **[问题位置]**（如：分镜2-口播）
   - **问题诊断**：...
   - **修改方案**：给出具体的修改后文案或画面

2. **[问题位置]**
   - **问题诊断**：...
   - **修改方案**：...

3. **[问题位置]**
   - **问题诊断**：...
   - **修改方案**：...
"#,
};

pub const REFINE_PROMPT: PromptTemplate = PromptTemplate {
    name: "refine",
    description: "根据评审意见修正脚本",
    template: r#"你是一位游戏广告创意专家，需要根据评审意见修改脚本。

## 游戏信息
- **游戏介绍：** {game_intro}
- **独特卖点（USP）：** {usp}
- **目标人群：** {target_audience}
- **游戏品类：** {category}

## 原始脚本
{script}

## 评审意见
{review_feedback}

## 修改要求
1. 逐条解决评审意见中的问题
2. 保留原脚本的亮点
3. 输出标准三栏表格

| 分镜 | 口播 | 设计意图 |
|------|------|----------|
| 画面描述 | 配音文案 | 创意目的 |

单元格只写纯文本，不要使用 HTML 标签。请输出完整的修改后脚本，不要省略分镜。"#,
};

pub const QUICK_PROMPT: PromptTemplate = PromptTemplate {
    name: "quick",
    description: "快速生成（无评审）",
    template: r#"你是一位游戏广告创意专家。请快速创作一条信息流广告脚本。

## 游戏信息
- **游戏介绍：** {game_intro}
- **独特卖点（USP）：** {usp}
- **目标人群：** {target_audience}
- **游戏品类：** {category}

直接输出 5-8 个分镜的三栏表格：

| 分镜 | 口播 | 设计意图 |
|------|------|----------|
| 画面描述 | 配音文案 | 创意目的 |

要求：开头 3 秒抓住注意力，清晰传达 USP，结尾有行动号召。"#,
};

/// Every built-in template
pub const BUILTIN_PROMPTS: [PromptTemplate; 8] = [
    AUTO_TAGGING_PROMPT,
    DRAFT_PROMPT,
    SLG_DRAFT_PROMPT,
    MMO_DRAFT_PROMPT,
    CASUAL_DRAFT_PROMPT,
    REVIEW_PROMPT,
    REFINE_PROMPT,
    QUICK_PROMPT,
];

/// Templates used by the pipeline, with optional operator overrides.
///
/// An override that fails to render is logged and the built-in template is
/// used instead; a built-in that fails to render is a caller error.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    overrides: HashMap<String, String>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from a JSON object of template name -> template text
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read prompts file: {:?}", path))?;
        let overrides: HashMap<String, String> =
            serde_json::from_str(&content).context("Prompts file must be a JSON object of strings")?;
        Ok(Self { overrides })
    }

    pub fn with_override(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), template.into());
        self
    }

    pub fn auto_tagging(&self, raw_content: &str) -> Result<String, PromptError> {
        self.render_with(&AUTO_TAGGING_PROMPT, "auto_tagging", &[("raw_content", raw_content)])
    }

    /// Draft prompt; SLG, MMO and casual games get a specialised template
    pub fn draft(&self, input: &GenerationInput, references: &str) -> Result<String, PromptError> {
        let template = match input.category() {
            Category::Slg => &SLG_DRAFT_PROMPT,
            Category::Mmo => &MMO_DRAFT_PROMPT,
            Category::Casual => &CASUAL_DRAFT_PROMPT,
            _ => &DRAFT_PROMPT,
        };
        let mut values = brief_values(input);
        values.push(("references", references));
        self.render_with(template, "draft", &values)
    }

    pub fn review(&self, input: &GenerationInput, script: &str, rag_traits: &str) -> Result<String, PromptError> {
        let mut values = brief_values(input);
        values.push(("script", script));
        values.push(("rag_traits", rag_traits));
        self.render_with(&REVIEW_PROMPT, "review", &values)
    }

    pub fn refine(&self, input: &GenerationInput, script: &str, review_feedback: &str) -> Result<String, PromptError> {
        let mut values = brief_values(input);
        values.push(("script", script));
        values.push(("review_feedback", review_feedback));
        self.render_with(&REFINE_PROMPT, "refine", &values)
    }

    pub fn quick(&self, input: &GenerationInput) -> Result<String, PromptError> {
        self.render_with(&QUICK_PROMPT, "quick", &brief_values(input))
    }

    fn render_with(
        &self,
        builtin: &PromptTemplate,
        override_key: &str,
        values: &[(&str, &str)],
    ) -> Result<String, PromptError> {
        if let Some(custom) = self.overrides.get(override_key) {
            match render(override_key, custom, values) {
                Ok(prompt) => return Ok(prompt),
                Err(e) => warn!("Custom '{}' prompt unusable, using built-in: {}", override_key, e),
            }
        }
        builtin.format(values)
    }
}

fn brief_values(input: &GenerationInput) -> Vec<(&'static str, &str)> {
    vec![
        ("game_intro", input.game_intro.as_str()),
        ("usp", input.usp.as_str()),
        ("target_audience", input.target_audience.as_str()),
        ("category", input.category.as_str()),
    ]
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn input() -> GenerationInput {
        GenerationInput {
            game_intro: "魔幻题材 MMO".to_string(),
            usp: "自由交易，装备可回收".to_string(),
            target_audience: "25-40 岁男性".to_string(),
            category: "MMO".to_string(),
            theme: None,
            gameplay: None,
        }
    }

    #[test]
    fn test_render_substitutes_and_unescapes() {
        let out = render("t", "a {x} {{literal}} b", &[("x", "1")]).unwrap();
        assert_eq!(out, "a 1 {literal} b");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render("t", "[{x}]", &[("x", "{y} and {{z}}")]).unwrap();
        assert_eq!(out, "[{y} and {{z}}]");
    }

    #[test]
    fn test_missing_value_fails_loudly() {
        let err = render("draft", "hello {name}", &[]).unwrap_err();
        assert_eq!(
            err,
            PromptError::MissingValue {
                template: "draft".to_string(),
                placeholder: "name".to_string()
            }
        );
    }

    #[test]
    fn test_unclosed_placeholder() {
        let err = render("t", "abc {oops", &[("oops", "x")]).unwrap_err();
        assert_eq!(
            err,
            PromptError::UnclosedPlaceholder {
                template: "t".to_string(),
                offset: 4
            }
        );
    }

    #[test]
    fn test_auto_tagging_contains_input_and_categories() {
        let raw = "万国觉醒是一款SLG游戏，开局送十连抽";
        let prompt = PromptLibrary::new().auto_tagging(raw).unwrap();

        assert!(prompt.contains(raw));
        for category in Category::ALL {
            assert!(prompt.contains(category.label()), "missing {}", category);
        }
        assert!(prompt.contains("\"subject_name\": \"万国觉醒\""));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_review_prompt_injects_traits_and_personas() {
        let traits = "测试特征内容_12345_唯一标识";
        let script = "| 分镜 | 口播 | 设计意图 |";
        let prompt = PromptLibrary::new().review(&input(), script, traits).unwrap();

        assert!(prompt.contains(traits));
        assert!(prompt.contains(script));
        assert!(prompt.contains("User Acquisition Specialist"));
        assert!(prompt.contains("Hardcore Gamer"));
        assert!(prompt.contains("Product Manager"));
        assert!(prompt.contains("3 条最高优先级"));
        assert_eq!(prompt.matches("自由交易，装备可回收").count(), 2);
    }

    #[test]
    fn test_refine_prompt_contains_full_feedback() {
        let feedback = "### 角色A\n判词...\n### 角色B\n判词...";
        let prompt = PromptLibrary::new().refine(&input(), "draft", feedback).unwrap();
        assert!(prompt.contains(feedback));
    }

    #[test]
    fn test_draft_uses_category_template() {
        let library = PromptLibrary::new();

        let mmo = library.draft(&input(), NO_REFERENCES).unwrap();
        assert!(mmo.contains("MMO 创作要点"));
        assert!(mmo.contains(NO_REFERENCES));

        let mut card = input();
        card.category = "卡牌".to_string();
        let generic = library.draft(&card, "### 参考脚本 1\nabc").unwrap();
        assert!(generic.contains("**游戏品类：** 卡牌"));
        assert!(generic.contains("### 参考脚本 1\nabc"));
    }

    #[test]
    fn test_builtin_placeholders() {
        assert_eq!(AUTO_TAGGING_PROMPT.placeholders(), vec!["raw_content"]);
        assert_eq!(
            REVIEW_PROMPT.placeholders(),
            vec!["game_intro", "usp", "target_audience", "category", "rag_traits", "script"]
        );
        for template in BUILTIN_PROMPTS {
            assert!(!template.placeholders().is_empty(), "{} has no slots", template.name);
        }
    }

    #[test]
    fn test_override_used_and_broken_override_falls_back() {
        let library = PromptLibrary::new().with_override("quick", "快速: {usp}");
        assert_eq!(library.quick(&input()).unwrap(), "快速: 自由交易，装备可回收");

        let broken = PromptLibrary::new().with_override("quick", "快速: {unknown}");
        let prompt = broken.quick(&input()).unwrap();
        assert!(prompt.contains("直接输出 5-8 个分镜"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{"refine": "改写 {script} 依据 {review_feedback}"}"#).unwrap();

        let library = PromptLibrary::from_file(&path).unwrap();
        let prompt = library.refine(&input(), "S", "F").unwrap();
        assert_eq!(prompt, "改写 S 依据 F");
    }

    // Brace-heavy text: values are inserted as-is, never re-parsed
    const BRACED_TEXT: &str = "([a-z中文 \\n]|\\{|\\}|\\{\\{|\\}\\}|\\{usp\\}){1,24}";

    proptest! {
        #[test]
        fn test_tagging_prompt_contains_any_copy(raw in BRACED_TEXT) {
            let prompt = PromptLibrary::new().auto_tagging(&raw).unwrap();
            prop_assert!(prompt.contains(&raw));
        }

        #[test]
        fn test_review_prompt_contains_any_script_and_traits(script in BRACED_TEXT, traits in BRACED_TEXT) {
            let prompt = PromptLibrary::new().review(&input(), &script, &traits).unwrap();
            prop_assert!(prompt.contains(&script));
            prop_assert!(prompt.contains(&traits));
        }
    }
}
