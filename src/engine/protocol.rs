//! The engine's line protocol.
//!
//! Every command is one `\n`-terminated line on the engine's stdin. Only
//! queries produce output: one JSON line on stdout.

use crate::validate::{LoadRecord, RegionCode};

/// Number of stdout lines the engine emits for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    Silent,
    OneLine,
}

impl ReplyShape {
    pub const fn count(self) -> usize {
        match self {
            Self::Silent => 0,
            Self::OneLine => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Command<'a> {
    /// `L <CODE> <SUBREGION> <V1> <V2> <V3> <DATE1> <DATE2>`
    Load(&'a LoadRecord),
    /// `Q <CODE>`
    Query(&'a RegionCode),
    /// `X`: the engine frees its tables and exits 0.
    Shutdown,
}

impl Command<'_> {
    pub fn reply_shape(&self) -> ReplyShape {
        match self {
            Command::Query(_) => ReplyShape::OneLine,
            Command::Load(_) | Command::Shutdown => ReplyShape::Silent,
        }
    }

    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Load(_) => "load",
            Command::Query(_) => "query",
            Command::Shutdown => "shutdown",
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Command::Load(r) => format!(
                "L {} {} {:.2} {:.2} {:.2} {} {}\n",
                r.region_code,
                r.sub_region,
                r.value_region,
                r.value_macro_region,
                r.value_national,
                r.reference_date,
                r.updated_date
            ),
            Command::Query(code) => format!("Q {code}\n"),
            Command::Shutdown => "X\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::RawIndicator;

    fn record() -> LoadRecord {
        LoadRecord::from_raw(&RawIndicator {
            region_code: "sp".to_string(),
            sub_region: "Grande Sao Paulo".to_string(),
            value_region: 12.346,
            value_macro_region: 7.0,
            value_national: 0.004,
            reference_date: "202310".to_string(),
            updated_date: "20231101".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn load_line_has_seven_fields() {
        let record = record();
        let line = Command::Load(&record).encode();
        assert_eq!(line, "L SP Grande_Sao_Paulo 12.35 7.00 0.00 202310 20231101\n");
        assert_eq!(line.trim_end().split(' ').count(), 8);
    }

    #[test]
    fn query_line() {
        let code = RegionCode::parse("rj").unwrap();
        assert_eq!(Command::Query(&code).encode(), "Q RJ\n");
    }

    #[test]
    fn shutdown_line() {
        assert_eq!(Command::Shutdown.encode(), "X\n");
    }

    #[test]
    fn only_queries_expect_a_reply() {
        let record = record();
        let code = RegionCode::parse("MG").unwrap();
        assert_eq!(Command::Query(&code).reply_shape().count(), 1);
        assert_eq!(Command::Load(&record).reply_shape().count(), 0);
        assert_eq!(Command::Shutdown.reply_shape(), ReplyShape::Silent);
    }
}
