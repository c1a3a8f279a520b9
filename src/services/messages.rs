use crate::models::{RecommendationResult, UserProfile};

pub const REFUSAL_FALLBACK: &str = "抱歉，我只能回答与阅读和书籍相关的问题。";
pub const NO_RESULTS: &str = "抱歉，没有找到相关的内容。请尝试换一个关键词或描述。";

const FEEDBACK_HINT: &str = "💬 如果你喜欢某个推荐，请告诉我！这样我能更好地了解你的偏好。";

const NEW_USER_WELCOME: &str = "欢迎使用灵魂伴侣推荐系统！ 📚

我是你的个性化阅读推荐助手，可以根据你的兴趣和需求推荐书籍和文章。

为了给你更好的推荐，我想了解一下：
1. 你平时喜欢阅读什么类型的内容？（如小说、技术、心理学等）
2. 你的阅读水平如何？（初级/中级/高级）
3. 你更喜欢中文还是英文内容？

当然，你也可以直接告诉我你想找什么样的书或文章！";

pub fn ranked_message(count: usize) -> String {
    format!("根据你的需求，我为你精心挑选了{}个推荐：", count)
}

/// Greeting shown when a session starts
pub fn welcome(profile: &UserProfile) -> String {
    if profile.is_new_user() {
        return NEW_USER_WELCOME.to_string();
    }

    format!(
        "欢迎回来！ 📚\n\n根据你的阅读偏好：\n{}\n\n请告诉我你想找什么样的书籍或文章，我会为你推荐最合适的内容！",
        profile.summary()
    )
}

/// Plain-text rendering of a result for chat-style clients
pub fn render(result: &RecommendationResult) -> String {
    if !result.success {
        return result.message.clone();
    }

    let mut lines = vec![result.message.clone(), String::new()];

    for (i, rec) in result.recommendations.iter().enumerate() {
        let item = &rec.item;
        lines.push(format!("【推荐 {}】{}", i + 1, item.title));
        lines.push(format!("作者：{}", item.author));
        lines.push(format!("来源：{}", item.source));

        if !item.description.is_empty() {
            lines.push(format!("简介：{}", item.description));
        }
        if let Some(reason) = rec.reason.as_deref().filter(|s| !s.is_empty()) {
            lines.push(format!("💡 推荐理由：{}", reason));
        }
        if let Some(highlights) = rec.highlights.as_deref().filter(|s| !s.is_empty()) {
            lines.push(format!("✨ 内容亮点：{}", highlights));
        }
        if let Some(scenario) = rec.scenario.as_deref().filter(|s| !s.is_empty()) {
            lines.push(format!("📖 适合场景：{}", scenario));
        }
        if !item.url.is_empty() {
            lines.push(format!("🔗 链接：{}", item.url));
        }
        if let Some(score) = rec.score {
            lines.push(format!("⭐ 评分：{}/10", score));
        }

        lines.push(String::new());
    }

    lines.push("---".to_string());
    lines.push(FEEDBACK_HINT.to_string());

    lines.join("\n")
}
