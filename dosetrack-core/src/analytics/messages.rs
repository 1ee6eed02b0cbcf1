//! Canned assistant messages
//!
//! Fixed message pools and pure selection logic. No model calls and no
//! randomness: the same context always yields the same reply, with variety
//! coming from a caller-supplied seed (typically the day number).

use crate::analytics::insights::UserContext;

/// Supportive one-liners for users struggling with adherence.
pub const SUPPORT_MESSAGES: &[&str] = &[
    "Remember, taking care of your health is an act of self-love!",
    "Every day you take your medications on time is a small victory!",
    "You're doing great! Keep up the excellent work!",
    "Healthy habits are built day by day. You're on the right path!",
    "Your discipline in taking medications is inspiring! Keep it up!",
];

/// Motivational one-liners for users starting over.
pub const MOTIVATIONAL_MESSAGES: &[&str] = &[
    "Today is a new day - new opportunities to take care of yourself!",
    "You've already taken an important step by adding medications to the app. Now just take them!",
    "Small steps every day lead to big results!",
    "Your health is your wealth. Invest in it every day!",
    "Remember: you're not alone on this journey to health!",
];

/// Pick from a pool by seed. Empty pools yield an empty string.
fn pick(pool: &[&'static str], seed: u64) -> &'static str {
    if pool.is_empty() {
        return "";
    }
    pool[(seed % pool.len() as u64) as usize]
}

/// Deterministic supportive message for a seed.
pub fn support_message(seed: u64) -> &'static str {
    pick(SUPPORT_MESSAGES, seed)
}

/// Deterministic motivational message for a seed.
pub fn motivational_message(seed: u64) -> &'static str {
    pick(MOTIVATIONAL_MESSAGES, seed)
}

/// Structured supportive reply assembled from the user context.
#[derive(Debug, Clone, Default)]
pub struct AssistantReply {
    /// Acknowledgement when adherence is slipping
    pub empathy: Option<String>,
    /// Positive reinforcement when there is any progress
    pub encouragement: Option<String>,
    /// Concrete habit advice when timing is inconsistent
    pub practical: Option<String>,
    /// Always present: a streak callout or a pool message
    pub motivation: String,
}

impl AssistantReply {
    /// Flatten into a single display string, sections in fixed order.
    pub fn to_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(s) = &self.empathy {
            parts.push(s.as_str());
        }
        if let Some(s) = &self.encouragement {
            parts.push(s.as_str());
        }
        if let Some(s) = &self.practical {
            parts.push(s.as_str());
        }
        parts.push(self.motivation.as_str());
        parts.join(" ")
    }
}

/// Assemble a supportive reply from the user context.
///
/// `seed` varies the pool picks (e.g. pass the day number); everything else
/// is a pure function of the context.
pub fn assistant_reply(ctx: &UserContext, seed: u64) -> AssistantReply {
    let mut reply = AssistantReply::default();

    if ctx.is_new_user {
        reply.motivation = "Let's get started! Add your medications, and I'll help you \
                            build the perfect medication schedule."
            .to_string();
        return reply;
    }

    if ctx.needs_encouragement {
        reply.empathy = Some(
            "I understand that sometimes it can be difficult to maintain regular \
             medication intake. You're not alone in this, and your efforts matter."
                .to_string(),
        );
    }

    if ctx.total_taken > 0 {
        reply.encouragement = Some(
            "You're already showing care for your health - that's wonderful! Every \
             medication taken on time is a step towards better well-being."
                .to_string(),
        );
    }

    if ctx.has_timing_issues {
        reply.practical = Some(
            "Try linking medication intake with daily activities: morning coffee, \
             brushing teeth, or checking the news. This helps create a sustainable habit."
                .to_string(),
        );
    }

    reply.motivation = if ctx.streak_days > 0 {
        format!(
            "Your result of {} consecutive days shows you have willpower! That's inspiring!",
            ctx.streak_days
        )
    } else {
        motivational_message(seed).to_string()
    };

    reply
}
