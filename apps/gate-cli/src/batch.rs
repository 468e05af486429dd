//! 批量载荷与退出码汇总。
//!
//! 退出码：`0` 全部放行；`1` 存在拒绝；`2` 系统 / 配置错误（优先于拒绝）。

use std::process::ExitCode;

/// 单条载荷的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    Denied,
    Failed,
}

/// 解析批量文件：每行一个载荷，忽略空行与 `#` 注释。
pub fn parse_batch(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub granted: usize,
    pub denied: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Granted => self.granted += 1,
            Verdict::Denied => self.denied += 1,
            Verdict::Failed => self.failed += 1,
        }
    }

    pub fn exit_status(&self) -> u8 {
        if self.failed > 0 {
            2
        } else if self.denied > 0 {
            1
        } else {
            0
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_skips_blank_and_comment_lines() {
        let content = "gym-1:member-1\n\n  # morning shift\n gym-1:member-2 \n";
        assert_eq!(parse_batch(content), vec!["gym-1:member-1", "gym-1:member-2"]);
    }

    #[test]
    fn failures_outrank_denials() {
        let mut summary = Summary::default();
        summary.record(Verdict::Granted);
        assert_eq!(summary.exit_status(), 0);
        summary.record(Verdict::Denied);
        assert_eq!(summary.exit_status(), 1);
        summary.record(Verdict::Failed);
        assert_eq!(summary.exit_status(), 2);
    }
}
