use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use trafficlog::context::{self, Context};
use trafficlog::{
    Fields, MemoryWriter, RotatingFile, RotatingFileConfig, Traffic, TrafficEntry, TrafficKind,
    TrafficWriter, fields,
};

fn memory_entry() -> (TrafficEntry, MemoryWriter) {
    let out = MemoryWriter::new();
    (TrafficEntry::new(Arc::new(out.clone())), out)
}

// =============================================================================
// Field sets
// =============================================================================

#[test]
fn test_with_fields_union_over_many_sets() {
    let (base, _) = memory_entry();
    let base = base.with_fields(fields! { "a" => 1, "shared" => "base" });
    let cases: Vec<Fields> = vec![
        Fields::new(),
        fields! { "shared" => "arg" },
        fields! { "b" => [1, 2], "shared" => serde_json::Value::Null },
        fields! { "a" => json!({ "nested": true }) },
    ];

    for f in cases {
        let derived = base.with_fields(f.clone());
        assert_eq!(base.fields(), &fields! { "a" => 1, "shared" => "base" });
        for (k, v) in &f {
            assert_eq!(derived.fields().get(k), Some(v));
        }
        for (k, v) in base.fields() {
            if !f.contains_key(k) {
                assert_eq!(derived.fields().get(k), Some(v));
            }
        }
    }
}

// =============================================================================
// Ignore filtering
// =============================================================================

#[test]
fn test_ignored_payload_keys_never_serialized() {
    let (entry, out) = memory_entry();
    let payload = json!({
        "user": "alice",
        "password": "p1",
        "card": {"number": "4111", "cvv": "123"},
    });
    let ignores = ["password", "cvv"];
    entry
        .with_ignores(ignores)
        .emit(&Traffic::access("login").with_request(&payload));

    let line = out.contents();
    for k in ignores {
        assert!(!line.contains(&format!("\"{k}\"")), "{k} leaked: {line}");
    }
    for k in ["user", "card", "number"] {
        assert!(line.contains(&format!("\"{k}\"")), "{k} missing: {line}");
    }
}

#[test]
fn test_ignores_accumulate_across_derivations() {
    let (entry, _) = memory_entry();
    let a = entry.with_ignores(["x"]);
    let b = a.with_ignores(vec![String::from("y")]);
    assert_eq!(a.ignores().len(), 1);
    assert!(b.ignores().contains("x") && b.ignores().contains("y"));
}

// =============================================================================
// Placeholders
// =============================================================================

#[test]
fn test_placeholder_positions_independent_of_other_values() {
    let (entry, out) = memory_entry();
    let records = [
        Traffic { code: 42, ..Default::default() },
        Traffic {
            cost: Duration::from_secs(3),
            request: Some(json!("ignored by positions")),
            ..Default::default()
        },
    ];
    for r in &records {
        entry.emit(r);
    }
    let lines = out.lines();
    assert!(lines[0].contains("|DATA|-|-|0ms|42|-"));
    assert!(lines[1].contains("|DATA|-|-|3000ms|0|-|request=ignored by positions"));
}

#[test]
fn test_access_kind_renders_recv_at() {
    let (entry, out) = memory_entry();
    let mut t = Traffic::access("ping");
    t.message = "pong".into();
    entry.emit(&t);
    assert_eq!(t.kind, Some(TrafficKind::Access));
    assert!(out.contents().contains("|DATA|recv_at|ping|0ms|0|pong\n"));
}

// =============================================================================
// Context handoff
// =============================================================================

#[test]
fn test_context_entry_crosses_thread_boundary() {
    let (entry, out) = memory_entry();
    let ctx = context::store(&Context::new(), entry.with_tracing("req-77"));

    let background = context::transplant(&ctx, &Context::new());
    std::thread::spawn(move || {
        context::retrieve(&background).emit(&Traffic::request("audit"));
    })
    .join()
    .unwrap();

    assert!(out.contents().contains("|sent_to|audit|0ms|0|-|trace_id=req-77\n"));
}

// =============================================================================
// Rotation through an entry
// =============================================================================

#[test]
fn test_entry_over_rotating_file_respects_backups() {
    let dir = tempfile::tempdir().unwrap();
    let file = RotatingFile::new(RotatingFileConfig {
        file_path: dir.path().join("data.log"),
        max_size_bytes: 300,
        max_backups: 3,
        max_age: None,
        rotate_daily: false,
    })
    .unwrap();
    let file = Arc::new(file);
    let entry = TrafficEntry::new(file.clone()).with_fields(fields! { "svc" => "gateway" });

    for i in 0..100 {
        entry.emit(&Traffic::request(format!("cmd-{i}")).with_cost(Duration::from_millis(i)));
    }
    file.flush().unwrap();

    let archives: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("data.log."))
        .collect();
    assert_eq!(archives.len(), 3);
    assert!(file.current_size() <= 300);

    let active = fs::read_to_string(dir.path().join("data.log")).unwrap();
    assert!(active.lines().last().unwrap().contains("|cmd-99|99ms|"));
}
