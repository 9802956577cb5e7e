// Natural-language updates resolved into structured wizard actions
use crate::domain::condition::{ConditionLogic, Operator, StatisticKind};
use crate::domain::defaults::{self, name_stem};
use crate::domain::evaluation::Expectation;
use crate::domain::report_config::TriggerCombination;
use crate::domain::session::{ActionKind, ConfigAction, ConfigSession, WizardState};
use crate::error::{ReportError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;

/// Read-only view of a session handed to a parser
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub state: WizardState,
    pub legal_actions: Vec<ActionKind>,
    pub channels: Vec<String>,
}

impl ParseContext {
    pub fn from_session(session: &ConfigSession, channels: Vec<String>) -> Self {
        Self {
            state: session.state(),
            legal_actions: session.legal_actions(),
            channels,
        }
    }

    fn allows(&self, kind: ActionKind) -> bool {
        self.legal_actions.contains(&kind)
    }
}

/// Turns free text into zero or more structured deltas. Parsers never touch
/// the session; zero deltas means the text was not understood.
#[async_trait]
pub trait NlParser: Send + Sync {
    async fn extract_deltas(&self, context: &ParseContext, text: &str) -> Result<Vec<ConfigAction>>;
}

/// Chinese names used on the test rigs, mapped to channel names
const CHANNEL_ALIASES: [(&str, &str); 7] = [
    ("低压转速", "Ng"),
    ("高压转速", "Np"),
    ("低压", "Ng"),
    ("高压", "Np"),
    ("转速", "Ng"),
    ("温度", "Temperature"),
    ("压力", "Pressure"),
];

/// Keyword and pattern matcher for English and Chinese phrasings
pub struct KeywordParser {
    cancel: Regex,
    back: Regex,
    confirm: Regex,
    next: Regex,
    remove: Regex,
    comparison: Regex,
    threshold: Regex,
    secondary_threshold: Regex,
    duration: Regex,
    focus: Regex,
    both: Regex,
    logic_or: Regex,
    logic_and: Regex,
    never: Regex,
    hold: Regex,
    disable: Regex,
    enable: Regex,
    sudden_increase: Regex,
    sudden_decrease: Regex,
    statistics: Vec<(StatisticKind, Regex)>,
    items: Vec<(&'static str, Regex)>,
    /// Word-bounded matcher per channel name, compiled on first use
    channel_patterns: DashMap<String, Regex>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ReportError::Parser(format!("invalid pattern '{}': {}", pattern, e)))
}

fn number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl KeywordParser {
    pub fn new() -> Result<Self> {
        let statistics = [
            (StatisticKind::Rms, r"(?i)\brms\b|root mean square|有效值|均方根"),
            (StatisticKind::StdDev, r"(?i)standard deviation|\bstd(?:_?dev)?\b|标准差"),
            (StatisticKind::Range, r"(?i)\brange\b|peak.to.peak|极差|变化幅度|波动"),
            (StatisticKind::Difference, r"(?i)\bdiff(?:erence)?\b|差值|变化量"),
            (StatisticKind::Instantaneous, r"(?i)\binstant(?:aneous)?\b|瞬时"),
            (StatisticKind::Maximum, r"(?i)\bmax(?:imum)?\b|最大"),
            (StatisticKind::Minimum, r"(?i)\bminimum\b|最小"),
            (StatisticKind::Average, r"(?i)\b(?:average|mean|avg)\b|平均|均值"),
        ]
        .into_iter()
        .map(|(kind, pattern)| Ok((kind, compile(pattern)?)))
        .collect::<Result<Vec<_>>>()?;

        let items = [
            ("over_temperature", r"(?i)over.?temp(?:erature)?|超温|温度过高"),
            ("over_speed", r"(?i)over.?speed|超速"),
            ("surge", r"(?i)\bsurge\b|喘振"),
            ("startup_reached", r"(?i)start.?up|启动"),
        ]
        .into_iter()
        .map(|(id, pattern)| Ok((id, compile(pattern)?)))
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            cancel: compile(r"(?i)\b(?:cancel|abort|quit)\b|取消配置|退出|算了")?,
            back: compile(r"(?i)\b(?:back|previous|undo)\b|上一步|返回")?,
            confirm: compile(r"(?i)\b(?:confirm|complete|finish|done|ok)\b|确认|完成|确定|好了")?,
            next: compile(r"(?i)\b(?:next|continue|proceed)\b|下一步|继续")?,
            remove: compile(r"(?i)\b(?:remove|deselect|unselect|drop)\b|去掉|删除|移除|取消选择")?,
            comparison: compile(
                r"(?i)(>=|<=|==|!=|>|<|大于等于|小于等于|不等于|大于|小于|等于|greater than or equal to|less than or equal to|greater than|less than|above|below|exceeds?)\s*(-?\d+(?:\.\d+)?)",
            )?,
            threshold: compile(
                r"(?i)(?:threshold|limit|阈值|门限|临界值)\s*(?:1\s+)?(?:to|=|:|为|设为|设置为|是)?\s*(-?\d+(?:\.\d+)?)",
            )?,
            secondary_threshold: compile(
                r"(?i)(?:threshold\s*2|second threshold|阈值\s*2|阈值二|第二阈值)\s*(?:to|=|:|为|设为|设置为|是)?\s*(-?\d+(?:\.\d+)?)",
            )?,
            duration: compile(
                r"(?i)(\d+(?:\.\d+)?)\s*(?:(milliseconds?|ms|seconds?|secs?|s|minutes?|mins?|hours?|h)\b|(毫秒|秒|分钟|小时))",
            )?,
            focus: compile(r"(?i)\bcondition\s*(\d+)|条件\s*(\d+)|第\s*(\d+)\s*个条件")?,
            both: compile(r"(?i)\bboth\b|condition\s*1\s*and\s*(?:condition\s*)?2|两个条件|条件1和条件2|条件一和条件二|同时")?,
            logic_or: compile(r"(?i)\blogic\s*(?:to\s*)?or\b|\bany of\b|\beither\b|或逻辑|或者|任一")?,
            logic_and: compile(r"(?i)\blogic\s*(?:to\s*)?and\b|\ball of\b|与逻辑|并且|同时满足")?,
            never: compile(r"(?i)\bnever\b|must not|不应|不得|不能出现|禁止")?,
            hold: compile(r"(?i)must hold|\balways\b|始终|一直满足|保持")?,
            disable: compile(r"(?i)\b(?:disable|turn off|not needed|without)\b|不需要|不用|禁用|关闭")?,
            enable: compile(r"(?i)\b(?:enable|turn on)\b|启用|开启|需要")?,
            sudden_increase: compile(r"(?i)sudden(?:ly)?\s*(?:increase|rise|jump)|突增|突变\s*>|骤升|突升")?,
            sudden_decrease: compile(r"(?i)sudden(?:ly)?\s*(?:decrease|drop|fall)|突降|突变\s*<|骤降")?,
            statistics,
            items,
            channel_patterns: DashMap::new(),
        })
    }

    fn channel_pattern(&self, channel: &str) -> Result<Option<Regex>> {
        if let Some(pattern) = self.channel_patterns.get(channel) {
            return Ok(Some(pattern.clone()));
        }
        let stem = name_stem(channel);
        if stem.is_empty() {
            return Ok(None);
        }
        let pattern = compile(&format!(
            r"(?i)(?:^|[^A-Za-z0-9_])({}|{})(?:$|[^A-Za-z0-9_])",
            regex::escape(channel),
            regex::escape(stem)
        ))?;
        self.channel_patterns.insert(channel.to_string(), pattern.clone());
        Ok(Some(pattern))
    }

    /// Channels named in `text`, in order of appearance
    fn mentioned_channels(&self, channels: &[String], text: &str) -> Result<Vec<String>> {
        let mut found: Vec<(usize, String)> = Vec::new();
        for channel in channels {
            let Some(pattern) = self.channel_pattern(channel)? else {
                continue;
            };
            if let Some(m) = pattern.captures(text).and_then(|c| c.get(1)) {
                found.push((m.start(), channel.clone()));
            }
        }
        // longer aliases first; a shorter one inside a consumed span is skipped
        let mut consumed: Vec<(usize, usize)> = Vec::new();
        for (alias, target) in CHANNEL_ALIASES {
            let Some(pos) = text.find(alias) else {
                continue;
            };
            let end = pos + alias.len();
            if consumed.iter().any(|(start, stop)| pos < *stop && *start < end) {
                continue;
            }
            consumed.push((pos, end));
            if let Some(channel) = defaults::resolve_channel(target, channels) {
                found.push((pos, channel));
            }
        }
        found.sort_by_key(|(pos, _)| *pos);
        let mut names: Vec<String> = Vec::new();
        for (_, name) in found {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn parse_duration(&self, text: &str) -> Option<f64> {
        let caps = self.duration.captures(text)?;
        let value = number(caps.get(1)?.as_str())?;
        let unit = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_lowercase())?;
        let scale = match unit.as_str() {
            "ms" | "millisecond" | "milliseconds" | "毫秒" => 0.001,
            "min" | "mins" | "minute" | "minutes" | "分钟" => 60.0,
            "h" | "hour" | "hours" | "小时" => 3600.0,
            _ => 1.0,
        };
        Some(value * scale)
    }

    fn parse_comparison(&self, text: &str) -> Option<(Operator, f64)> {
        let caps = self.comparison.captures(text)?;
        let operator = match caps.get(1)?.as_str().to_lowercase().as_str() {
            ">=" | "大于等于" | "greater than or equal to" => Operator::Ge,
            "<=" | "小于等于" | "less than or equal to" => Operator::Le,
            "==" | "等于" => Operator::Eq,
            "!=" | "不等于" => Operator::Ne,
            "<" | "小于" | "less than" | "below" => Operator::Lt,
            _ => Operator::Gt,
        };
        Some((operator, number(caps.get(2)?.as_str())?))
    }

    fn parse_focus(&self, text: &str) -> Option<usize> {
        let caps = self.focus.captures(text)?;
        let digits = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
        digits.as_str().parse().ok()
    }

    fn parse(&self, context: &ParseContext, text: &str) -> Result<Vec<ConfigAction>> {
        if self.cancel.is_match(text) && context.allows(ActionKind::Cancel) {
            return Ok(vec![ConfigAction::Cancel]);
        }
        if self.back.is_match(text) && context.allows(ActionKind::PreviousStep) {
            return Ok(vec![ConfigAction::PreviousStep]);
        }

        let mut deltas = Vec::new();
        let removing = self.remove.is_match(text);

        let channels = self.mentioned_channels(&context.channels, text)?;
        if context.allows(ActionKind::SelectChannel) {
            for channel in channels {
                if removing && context.allows(ActionKind::DeselectChannel) {
                    deltas.push(ConfigAction::DeselectChannel(channel));
                } else {
                    deltas.push(ConfigAction::SelectChannel(channel));
                }
            }
        } else if context.allows(ActionKind::SetChannel) {
            if let Some(channel) = channels.into_iter().next() {
                deltas.push(ConfigAction::SetChannel(channel));
            }
        }

        if context.allows(ActionKind::SelectItem) {
            let mut mentioned: Vec<(usize, &str)> = self
                .items
                .iter()
                .filter_map(|(id, pattern)| pattern.find(text).map(|m| (m.start(), *id)))
                .collect();
            mentioned.sort_by_key(|(pos, _)| *pos);
            for (_, id) in mentioned {
                if removing {
                    deltas.push(ConfigAction::DeselectItem(id.to_string()));
                } else {
                    deltas.push(ConfigAction::SelectItem(id.to_string()));
                }
            }
        }

        if context.allows(ActionKind::SetCombination) {
            let combination = if self.both.is_match(text) {
                Some(TriggerCombination::And)
            } else {
                match self.parse_focus(text) {
                    Some(1) => Some(TriggerCombination::Cond1Only),
                    Some(2) => Some(TriggerCombination::Cond2Only),
                    _ => None,
                }
            };
            if let Some(combination) = combination {
                deltas.push(ConfigAction::SetCombination(combination));
            }
        } else if context.allows(ActionKind::FocusCondition) {
            if let Some(n) = self.parse_focus(text) {
                deltas.push(ConfigAction::FocusCondition(n));
            }
        }

        if context.allows(ActionKind::SetMetricEnabled) {
            if self.disable.is_match(text) {
                deltas.push(ConfigAction::SetMetricEnabled(false));
            } else if self.enable.is_match(text) {
                deltas.push(ConfigAction::SetMetricEnabled(true));
            }
        }

        if context.allows(ActionKind::SetStatistic) {
            if let Some((kind, _)) = self.statistics.iter().find(|(_, pattern)| pattern.is_match(text)) {
                deltas.push(ConfigAction::SetStatistic(*kind));
            }
        }

        if context.allows(ActionKind::SetDuration) {
            if let Some(seconds) = self.parse_duration(text) {
                deltas.push(ConfigAction::SetDuration(seconds));
            }
        }

        let comparison = self.parse_comparison(text);
        if context.allows(ActionKind::SetOperator) {
            if self.sudden_increase.is_match(text) {
                deltas.push(ConfigAction::SetOperator(Operator::SuddenIncrease));
            } else if self.sudden_decrease.is_match(text) {
                deltas.push(ConfigAction::SetOperator(Operator::SuddenDecrease));
            } else if let Some((operator, _)) = comparison {
                deltas.push(ConfigAction::SetOperator(operator));
            }
        }

        let mut rest = std::borrow::Cow::Borrowed(text);
        if context.allows(ActionKind::SetSecondaryThreshold) {
            if let Some(value) = self
                .secondary_threshold
                .captures(text)
                .and_then(|caps| number(caps.get(1)?.as_str()))
            {
                deltas.push(ConfigAction::SetSecondaryThreshold(value));
                rest = self.secondary_threshold.replace_all(text, " ");
            }
        }
        if context.allows(ActionKind::SetThreshold) {
            let value = self
                .threshold
                .captures(&rest)
                .and_then(|caps| number(caps.get(1)?.as_str()))
                .or_else(|| self.parse_comparison(&rest).map(|(_, value)| value));
            if let Some(value) = value {
                deltas.push(ConfigAction::SetThreshold(value));
            }
        }

        if context.allows(ActionKind::SetLogic) {
            if self.logic_or.is_match(text) {
                deltas.push(ConfigAction::SetLogic(ConditionLogic::Or));
            } else if self.logic_and.is_match(text) {
                deltas.push(ConfigAction::SetLogic(ConditionLogic::And));
            }
        }

        if context.allows(ActionKind::SetExpectation) {
            if self.never.is_match(text) {
                deltas.push(ConfigAction::SetExpectation(Expectation::MustNeverOccur));
            } else if self.hold.is_match(text) {
                deltas.push(ConfigAction::SetExpectation(Expectation::MustHold));
            }
        }

        // navigation goes last so edits land on the current step
        let confirm = self.confirm.is_match(text);
        if confirm && context.allows(ActionKind::Complete) {
            deltas.push(ConfigAction::Complete);
        } else if (confirm || self.next.is_match(text)) && context.allows(ActionKind::NextStep) {
            deltas.push(ConfigAction::NextStep);
        }

        tracing::debug!(
            "Parsed {} deltas in state {}",
            deltas.len(),
            context.state.name()
        );
        Ok(deltas)
    }
}

#[async_trait]
impl NlParser for KeywordParser {
    async fn extract_deltas(&self, context: &ParseContext, text: &str) -> Result<Vec<ConfigAction>> {
        self.parse(context, text)
    }
}
