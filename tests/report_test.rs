//! End-to-end report building over a fake Claude home

mod common;

use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use claude_usage_chart::analyzer::{render_report, report_json, ReportOptions, TodayReading};
use claude_usage_chart::chart::ChartOptions;
use claude_usage_chart::parser::FileParser;
use claude_usage_chart::time::DisplayTz;
use claude_usage_chart::{DataStatus, UsageAnalyzer, SYNTHETIC_MODEL};
use common::{
    assistant_line, gemini_message, hours_ago, user_line, write_gemini_session, ClaudeHome,
};

fn options(days: u32, interval_hours: u32) -> ReportOptions {
    ReportOptions {
        days,
        tz: DisplayTz::Named(Tz::UTC),
        interval_hours,
        chart: ChartOptions {
            height: 8,
            color: false,
            ..ChartOptions::default()
        },
    }
}

fn populated_home() -> ClaudeHome {
    let home = ClaudeHome::new();
    home.write_session(
        "-home-me-api",
        "a",
        &[
            user_line(hours_ago(2)),
            assistant_line(hours_ago(2), "claude-sonnet-4-5", 1_000, 200, 5_000, 40_000),
            assistant_line(hours_ago(1), "claude-sonnet-4-5", 500, 100, 0, 42_000),
            "{not json".to_string(),
            assistant_line(hours_ago(1), "<synthetic>", 0, 0, 0, 0),
        ],
    );
    home.write_vm_session(
        "builder",
        "-work",
        "b",
        &[assistant_line(hours_ago(3), "claude-opus-4-1", 10, 2_000, 300, 0)],
    );
    home
}

#[test]
fn test_report_combines_main_and_vm_roots() {
    let home = populated_home();
    let analyzer = UsageAnalyzer::new(FileParser::new(home.path(), true));
    let report = analyzer.build_report(&options(7, 1), Utc::now()).unwrap();

    assert_eq!(report.status, DataStatus::Available);
    assert_eq!(report.stats.roots, 2);
    assert_eq!(report.stats.files_scanned, 2);
    assert_eq!(report.stats.lines_undecodable, 1);

    let totals = report.summary.totals;
    assert_eq!(totals.messages, 4);
    assert_eq!(totals.input_tokens, 1_510);
    assert_eq!(totals.output_tokens, 2_300);
    assert_eq!(totals.cache_creation_tokens, 5_300);
    assert_eq!(totals.cache_read_tokens, 82_000);

    assert_eq!(report.summary.models.len(), 3);
    assert_eq!(report.summary.models[SYNTHETIC_MODEL].messages, 1);
    assert_eq!(report.summary.models["claude-sonnet-4-5"].messages, 2);
}

#[test]
fn test_excluding_vms() {
    let home = populated_home();
    let analyzer = UsageAnalyzer::new(FileParser::new(home.path(), false));
    let report = analyzer.build_report(&options(7, 1), Utc::now()).unwrap();

    assert_eq!(report.stats.roots, 1);
    assert!(!report.summary.models.contains_key("claude-opus-4-1"));
}

#[test]
fn test_series_matches_totals() {
    let home = populated_home();
    let analyzer = UsageAnalyzer::new(FileParser::new(home.path(), true));
    let report = analyzer.build_report(&options(3, 3), Utc::now()).unwrap();

    let from_buckets: u64 = report
        .summary
        .series
        .values()
        .map(|bucket| bucket.counts.total_tokens())
        .sum();
    assert_eq!(from_buckets, report.summary.totals.total_tokens());

    for (start, bucket) in &report.summary.series {
        assert_eq!(bucket.start, *start);
        assert_eq!(chrono::Timelike::hour(start) % 3, 0);
    }
}

#[test]
fn test_rendered_sections_in_order() {
    let home = populated_home();
    let analyzer = UsageAnalyzer::new(FileParser::new(home.path(), true));
    let opts = options(2, 1);
    let report = analyzer.build_report(&opts, Utc::now()).unwrap();
    let text = render_report(&report, &opts);

    let stats = text.find("Overall Usage Statistics").unwrap();
    let table = text.find("Usage by Model").unwrap();
    let tokens = text.find("Token Usage Over Time (1-hour intervals, UTC)").unwrap();
    let cache = text.find("Cache Token Usage Over Time (1-hour intervals, UTC)").unwrap();
    assert!(stats < table && table < tokens && tokens < cache);

    assert!(text.contains("Total messages:        4"));
    assert!(text.contains("Legend: █ Input  ▓ Output"));
    assert!(text.contains("Legend: ▒ Cache creation  ░ Cache read"));
    assert!(text.contains("Buckets: 72"));
}

#[test]
fn test_json_report() {
    let home = populated_home();
    let analyzer = UsageAnalyzer::new(FileParser::new(home.path(), true));
    let report = analyzer.build_report(&options(7, 1), Utc::now()).unwrap();
    let value = report_json(&report);

    assert_eq!(value["status"], "available");
    assert_eq!(value["totals"]["messages"], 4);
    assert_eq!(value["models"].as_array().unwrap().len(), 3);
    assert_eq!(value["models"][0]["model"], "claude-sonnet-4-5");
    assert_eq!(value["scan"]["roots"], 2);
}

#[test]
fn test_today_counts_only_since_reset() {
    let home = ClaudeHome::new();
    let now = Utc::now();
    home.write_session(
        "p",
        "s",
        &[
            assistant_line(now, "claude-haiku", 1_500, 20, 0, 0),
            assistant_line(now - chrono::Duration::days(2), "claude-haiku", 9_000, 9_000, 0, 0),
        ],
    );

    let analyzer = UsageAnalyzer::new(FileParser::new(home.path(), false));
    let reading = analyzer.today(now, DisplayTz::Named(Tz::UTC), 0).unwrap();
    let TodayReading::Counts(counts) = reading else {
        panic!("expected counts, got {:?}", reading);
    };
    assert_eq!(counts.messages, 1);
    assert_eq!(counts.input_tokens, 1_500);
    assert_eq!(counts.output_tokens, 20);
}

#[test]
fn test_missing_home() {
    let home = ClaudeHome::new();
    let analyzer = UsageAnalyzer::new(FileParser::new(home.missing(), true));

    let report = analyzer.build_report(&options(7, 1), Utc::now()).unwrap();
    assert_eq!(report.status, DataStatus::MissingSource);
    assert!(report.summary.is_empty());

    let reading = analyzer
        .today(Utc::now(), DisplayTz::Named(Tz::UTC), 3)
        .unwrap();
    assert_eq!(reading, TodayReading::NoSource);
}

#[test]
fn test_two_models_over_two_buckets() {
    let home = ClaudeHome::new();
    let at = |h, m| Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap();
    home.write_session(
        "p",
        "s",
        &[
            assistant_line(at(10, 5), "sonnet", 500, 100, 0, 0),
            assistant_line(at(10, 35), "sonnet", 500, 0, 0, 1_000),
            assistant_line(at(14, 20), "haiku", 0, 50, 0, 0),
        ],
    );

    let analyzer = UsageAnalyzer::new(FileParser::new(home.path(), false));
    let report = analyzer.build_report(&options(7, 1), at(20, 0)).unwrap();
    let summary = &report.summary;

    let sonnet = summary.models["sonnet"];
    assert_eq!(
        (sonnet.messages, sonnet.input_tokens, sonnet.output_tokens, sonnet.cache_read_tokens),
        (2, 1_000, 100, 1_000)
    );
    let haiku = summary.models["haiku"];
    assert_eq!((haiku.messages, haiku.input_tokens, haiku.output_tokens), (1, 0, 50));
    assert_eq!(
        (
            summary.totals.messages,
            summary.totals.input_tokens,
            summary.totals.output_tokens,
            summary.totals.cache_read_tokens
        ),
        (3, 1_000, 150, 1_000)
    );

    let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
    let ten = day.and_hms_opt(10, 0, 0).unwrap();
    let fourteen = day.and_hms_opt(14, 0, 0).unwrap();
    assert_eq!(summary.series.keys().copied().collect::<Vec<_>>(), vec![ten, fourteen]);
    assert_eq!(summary.series[&ten].counts.total_tokens(), 2_100);
    assert_eq!(summary.series[&ten].counts.messages, 2);
    assert_eq!(summary.series[&fourteen].counts.output_tokens, 50);
    assert_eq!(summary.series[&fourteen].counts.messages, 1);
}

#[test]
fn test_gemini_sessions_join_the_report() {
    let home = ClaudeHome::new();
    let gemini = ClaudeHome::new();
    home.write_session(
        "p",
        "s",
        &[assistant_line(hours_ago(2), "claude-sonnet-4-5", 100, 10, 0, 0)],
    );
    write_gemini_session(
        gemini.path(),
        "f00",
        "one",
        &[
            r#"{"id":"u","type":"user","timestamp":"2025-01-01T00:00:00Z","content":"hi"}"#.to_string(),
            gemini_message(hours_ago(1), "gemini-2.5-pro", 2_000, 30, 1_500, 20),
        ],
    );

    let claude_only = UsageAnalyzer::new(FileParser::new(home.path(), false));
    let report = claude_only.build_report(&options(7, 1), Utc::now()).unwrap();
    assert_eq!(report.summary.totals.messages, 1);

    let parser = FileParser::new(home.path(), false).with_gemini_home(gemini.path());
    let report = UsageAnalyzer::new(parser)
        .build_report(&options(7, 1), Utc::now())
        .unwrap();
    assert_eq!(report.stats.roots, 2);
    assert_eq!(report.summary.totals.messages, 2);

    let gemini_counts = report.summary.models["gemini-2.5-pro"];
    assert_eq!(gemini_counts.input_tokens, 500);
    assert_eq!(gemini_counts.output_tokens, 50);
    assert_eq!(gemini_counts.cache_read_tokens, 1_500);
    assert_eq!(gemini_counts.total_tokens(), 2_050);
}

#[test]
fn test_gemini_alone_is_a_source() {
    let home = ClaudeHome::new();
    let gemini = ClaudeHome::new();
    write_gemini_session(
        gemini.path(),
        "f00",
        "one",
        &[gemini_message(Utc::now(), "gemini-2.5-flash", 300, 5, 0, 0)],
    );

    let parser = FileParser::new(home.missing(), true).with_gemini_home(gemini.path());
    let analyzer = UsageAnalyzer::new(parser);
    let reading = analyzer
        .today(Utc::now(), DisplayTz::Named(Tz::UTC), 0)
        .unwrap();
    assert_eq!(
        reading,
        TodayReading::Counts(claude_usage_chart::models::TokenCounts {
            messages: 1,
            input_tokens: 300,
            output_tokens: 5,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
        })
    );
}
