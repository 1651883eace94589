use crate::models::Category;

/// Generic high-performing traits, used for unlisted categories and
/// whenever a lookup fails
pub const DEFAULT_TRAITS: &str = "【通用高转化特征】
买量文案必备要素：
1. 黄金前3秒必须吸睛（悬念/冲突/利益点）
2. 卖点清晰，USP 必须在脚本中明确传达
3. 内容风格匹配目标人群
4. 节奏紧凑，避免冗余镜头
5. 强力 CTA 引导转化（立即下载/限时福利）
6. 避免使用 HTML 标签，保持纯文本格式";

const SLG_TRAITS: &str = "【SLG 高转化特征】
核心特征：增长强劲，吸金能力强，头部集中度高，核心用户注重智力挑战

买量文案必备要素：
1. 前3秒必须展示战力数值跳动或地图扩张
2. 必须包含'以弱胜强'的策略反转
3. 突出'深度策略博弈''资源管理规划'
4. 强调'大规模战争场面''联盟社交协作'
5. 融合副玩法则强调'轻松上手+深度策略并存'
6. 结尾强调'开局送连抽'或限时福利";

const MMO_TRAITS: &str = "【MMO 高转化特征】
核心特征：市场基数大，仍为买量大户，正向轻量化转型

买量文案必备要素：
1. 必须展示高精度捏脸或装备发光特效
2. 轻量化产品突出'低门槛上手''碎片化体验'
3. 传统产品强调'宏大世界观''高清画质'
4. 突出'丰富社交系统''职业多元养成'
5. 强调'自由交易'或'回收'利益点
6. 拒绝长旁白，多用战斗实录";

const CASUAL_TRAITS: &str = "【休闲游戏高转化特征】
核心特征：用户渗透率高，广告容忍度高，全年龄覆盖

买量文案必备要素：
1. 前3秒必须展示核心玩法爽感
2. 强调'3秒上手''5秒爽感''轻松解压'
3. 突出'古风/萌系画风''关卡丰富'
4. 消除类强调'消除即得奖励'
5. 网赚类主打'看广告领红包''零门槛赚钱''随时提现'
6. 放置类突出'离线也升级''自动战斗获资源'";

const CARD_TRAITS: &str = "【卡牌游戏高转化特征】
核心特征：开发成本低，生命周期长，适配多元题材

买量文案必备要素：
1. 前3秒展示稀有卡牌或抽卡动画
2. 强调'海量卡牌收集''策略阵容搭配'
3. 突出'抽卡概率透明''PVP竞技对抗'
4. 融合创新玩法则突出'卡牌+roguelike''卡牌+自走棋'
5. 二次元卡牌主打IP联动、精美立绘
6. 结尾强调首抽福利或保底机制";

const ANIME_TRAITS: &str = "【二次元游戏高转化特征】
核心特征：用户年轻化（18-25岁），女性占比高，对IP和画风敏感

买量文案必备要素：
1. 前3秒必须展示精美角色立绘或动态CG
2. 主打IP联动效应（如有）
3. 突出'沉浸式剧情''个性化角色养成'
4. 强调'二次元专属世界观'
5. 展示角色语音、Live2D等特色
6. 避免过度商业化表达，保持调性";

const SIMULATION_TRAITS: &str = "【模拟经营高转化特征】
核心特征：用户粘性强，适合长线运营，女性用户占比高

买量文案必备要素：
1. 前3秒展示经营成果或装扮效果
2. 突出'从零开始打造''亲手建设'的成就感
3. 强调'自由装扮''个性化定制'
4. 展示社交互动、好友互访功能
5. 融合消除玩法则突出'资源获取-场景升级'闭环
6. 结尾强调开局福利或限时活动";

const SHOOTER_TRAITS: &str = "【射击游戏高转化特征】
核心特征：表现突出，细分标签多元（英雄射击/二次元/飞行射击）

买量文案必备要素：
1. 前3秒必须展示流畅操作或精彩击杀
2. 突出'流畅操作体验''丰富武器系统'
3. 强调'竞技对抗快感'
4. 英雄射击强化'英雄技能策略'
5. 二次元射击突出'二次元画风'
6. 飞行射击强调'空中激战'体验";

const LEGEND_TRAITS: &str = "【传奇游戏高转化特征】
核心特征：用户忠诚度高，经典玩法黏性强，情怀驱动

买量文案必备要素：
1. 前3秒必须展示'一刀999'或爆装备场面
2. 主打'情怀回归''经典复刻'
3. 突出'装备全靠打''自由PK'
4. 强调'沙城争霸'等核心爽点
5. 展示极致打击感、全屏技能特效
6. 结尾强调'BOSS挑战掉落''快速升级成长'";

/// Built-in high-performing traits for a category
pub fn high_performing_traits(category: Category) -> &'static str {
    match category {
        Category::Slg => SLG_TRAITS,
        Category::Mmo => MMO_TRAITS,
        Category::Casual => CASUAL_TRAITS,
        Category::Card => CARD_TRAITS,
        Category::Anime => ANIME_TRAITS,
        Category::Simulation => SIMULATION_TRAITS,
        Category::Shooter => SHOOTER_TRAITS,
        Category::Legend => LEGEND_TRAITS,
        Category::Other => DEFAULT_TRAITS,
    }
}

/// Copy guidance for one game theme or core gameplay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraitProfile {
    pub name: &'static str,
    pub core: &'static str,
    pub focus: &'static [&'static str],
}

impl TraitProfile {
    /// Render as a `【<name><kind>特征】` section
    fn section(&self, kind: &str) -> String {
        let mut text = format!("\n\n【{}{}特征】\n核心特征：{}\n文案侧重点：\n", self.name, kind, self.core);
        for point in self.focus {
            text.push_str(&format!("- {}\n", point));
        }
        text
    }
}

const HISTORY_FOCUS: &[&str] = &[
    "强调历史还原度、策略深度",
    "突出'真实历史地图''海量武将养成'",
    "强调'权谋博弈''万人同屏国战'",
];
const HISTORY_CORE: &str = "策略属性强，用户群体成熟（25-50岁），生命周期长";
const XIA_CORE: &str = "关联国潮文化，用户对传统文化认同感强";
const MODERN_CORE: &str = "类型多元，适配轻度/中重度玩法，用户分布均衡";
const MODERN_FOCUS: &[&str] = &[
    "轻度玩法突出'贴近现实''简单易上手'",
    "中重度玩法强调'真实感代入''都市冒险/职场成长'",
    "强调'即时互动社交'",
];

pub const THEME_TRAITS: &[TraitProfile] = &[
    TraitProfile {
        name: "魔幻",
        core: "用户基数大、付费能力强",
        focus: &[
            "突出画质质感、激烈战斗场面、装备系统",
            "强调'沉浸式奇幻世界观'",
            "强调'高自由度探索'",
            "强调'珍稀装备掉落'",
        ],
    },
    TraitProfile {
        name: "传奇",
        core: "用户忠诚度高，经典玩法黏性强",
        focus: &[
            "主打'情怀回归''经典复刻'",
            "突出'一刀999''装备全靠打'",
            "强调'自由PK''沙城争霸'等核心爽点",
        ],
    },
    TraitProfile {
        name: "三国",
        core: HISTORY_CORE,
        focus: HISTORY_FOCUS,
    },
    TraitProfile {
        name: "历史",
        core: HISTORY_CORE,
        focus: HISTORY_FOCUS,
    },
    TraitProfile {
        name: "战争",
        core: "涵盖现代/近代/未来战争，男性用户主导",
        focus: &[
            "突出'真实战争场景''兵种策略搭配'",
            "强调'大规模团战''武器装备升级'",
            "按细分领域强化差异（如未来战争突出科幻武器）",
        ],
    },
    TraitProfile {
        name: "武侠",
        core: XIA_CORE,
        focus: &["营造东方美学意境", "突出'轻功快意江湖''武侠情怀还原'", "强调'国风画质'"],
    },
    TraitProfile {
        name: "仙侠",
        core: XIA_CORE,
        focus: &["营造东方美学意境", "突出'仙盟社交''渡劫修仙'", "强调'国风画质'"],
    },
    TraitProfile {
        name: "二次元",
        core: "用户年轻化（18-25岁），女性占比高，对IP和画风敏感",
        focus: &[
            "主打IP联动效应",
            "突出'精美角色立绘''沉浸式剧情'",
            "强调'个性化角色养成''二次元专属世界观'",
        ],
    },
    TraitProfile {
        name: "现代",
        core: MODERN_CORE,
        focus: MODERN_FOCUS,
    },
    TraitProfile {
        name: "都市",
        core: MODERN_CORE,
        focus: MODERN_FOCUS,
    },
];

pub const GAMEPLAY_TRAITS: &[TraitProfile] = &[
    TraitProfile {
        name: "休闲消除",
        core: "用户渗透率56.9%，广告容忍度高（76.4%），全年龄覆盖",
        focus: &[
            "强调'3秒上手''5秒爽感''轻松解压'",
            "突出'古风/萌系画风''关卡丰富'",
            "强调'消除即得奖励'",
        ],
    },
    TraitProfile {
        name: "网赚",
        core: "增长率最高，用户门槛低，变现直接",
        focus: &["主打'看广告领红包''零门槛赚钱'", "强调'随时提现''轻松躺赚'", "强化奖励真实性"],
    },
    TraitProfile {
        name: "放置挂机",
        core: "低操作门槛，离线可成长，适配碎片化时间",
        focus: &[
            "突出'离线也升级''自动战斗获资源'",
            "强调'上班/摸鱼轻松玩'",
            "新增策略元素则强调'阵容搭配自由''成长路径可控'",
        ],
    },
    TraitProfile {
        name: "益智解谜",
        core: "用户对可玩性要求提升，需差异化创新",
        focus: &["强调'烧脑趣味''创意关卡设计'", "突出'剧情式解谜''解锁隐藏结局'"],
    },
    TraitProfile {
        name: "传奇ARPG",
        core: "玩法成熟，用户黏性强，战斗爽感突出",
        focus: &["突出'极致打击感''全屏技能特效'", "强调'BOSS挑战掉落''快速升级成长'"],
    },
    TraitProfile {
        name: "卡牌",
        core: "开发成本低，生命周期长，适配多元题材",
        focus: &[
            "强调'海量卡牌收集''策略阵容搭配'",
            "突出'抽卡概率透明''PVP竞技对抗'",
            "融合创新玩法则突出'卡牌+roguelike''卡牌+自走棋'等差异化体验",
        ],
    },
    TraitProfile {
        name: "射击",
        core: "表现突出，细分标签多元（英雄射击/二次元/飞行射击）",
        focus: &[
            "突出'流畅操作体验''丰富武器系统'",
            "强调'竞技对抗快感'",
            "差异化标签强化'英雄技能策略''二次元画风''空中激战'",
        ],
    },
];

fn find_profile(table: &'static [TraitProfile], name: &str) -> Option<&'static TraitProfile> {
    let name = name.trim();
    table.iter().find(|profile| profile.name == name)
}

pub fn theme_traits(theme: &str) -> Option<&'static TraitProfile> {
    find_profile(THEME_TRAITS, theme)
}

pub fn gameplay_traits(gameplay: &str) -> Option<&'static TraitProfile> {
    find_profile(GAMEPLAY_TRAITS, gameplay)
}

/// Category traits followed by the theme and gameplay sections, when those
/// are given and listed. Unlisted names add nothing.
pub fn combine_traits(category_traits: &str, theme: Option<&str>, gameplay: Option<&str>) -> String {
    let mut combined = category_traits.to_string();
    if let Some(profile) = theme.and_then(theme_traits) {
        combined.push_str(&profile.section("题材"));
    }
    if let Some(profile) = gameplay.and_then(gameplay_traits) {
        combined.push_str(&profile.section("玩法"));
    }
    combined
}
