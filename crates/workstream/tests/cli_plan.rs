mod common;

use std::fs;

use anyhow::Result;
use predicates::prelude::*;

use crate::common::{PLAN, STREAM, TestEnv};

#[test]
fn show_prints_the_tree() -> Result<()> {
  TestEnv::run(|env| -> Result<()> {
    env.write_plan(PLAN)?;
    env
      .workstream()?
      .args(["plan", "show", STREAM])
      .assert()
      .success()
      .stdout(
        predicate::str::contains("Plan: Payments")
          .and(predicate::str::contains("Stage 1: Setup"))
          .and(predicate::str::contains("1 open question(s)"))
          .and(predicate::str::contains("Batch 01: Init"))
          .and(predicate::str::contains("01.01.02 Config")),
      );
    Ok(())
  })
}

#[test]
fn show_json_emits_the_document() -> Result<()> {
  TestEnv::run(|env| -> Result<()> {
    env.write_plan(PLAN)?;
    let out = env
      .workstream()?
      .args(["plan", "show", STREAM, "--json"])
      .output()?;
    assert!(out.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(doc["streamName"], "Payments");
    assert_eq!(doc["summary"], "Rebuild the payment pipeline.");
    assert_eq!(doc["references"][0], "docs/payments.md");
    let thread = &doc["stages"][0]["batches"][0]["threads"][0];
    assert_eq!(thread["name"], "Boot");
    assert_eq!(thread["summary"], "hello");
    assert_eq!(thread["details"], "boot the app");
    assert_eq!(doc["stages"][0]["questions"][0]["resolved"], true);
    Ok(())
  })
}

#[test]
fn validate_succeeds_on_a_clean_plan() -> Result<()> {
  TestEnv::run(|env| -> Result<()> {
    env.write_plan(PLAN)?;
    env
      .workstream()?
      .args(["plan", "validate", STREAM])
      .assert()
      .success()
      .stdout(predicate::str::contains("1 stage(s), 2 thread(s)"));
    Ok(())
  })
}

#[test]
fn validate_fails_without_plan_heading() -> Result<()> {
  TestEnv::run(|env| -> Result<()> {
    env.write_plan("# Payments\n\n### Stage 1: Setup\n")?;
    env
      .workstream()?
      .args(["plan", "validate", STREAM])
      .assert()
      .failure()
      .stderr(predicate::str::contains("problem(s)"));
    Ok(())
  })
}

#[test]
fn missing_plan_file_is_reported() -> Result<()> {
  TestEnv::run(|env| -> Result<()> {
    env
      .workstream()?
      .args(["plan", "show", "nope"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("plan file not found"));
    Ok(())
  })
}

#[test]
fn threads_lists_addresses() -> Result<()> {
  TestEnv::run(|env| -> Result<()> {
    env.write_plan(PLAN)?;
    env
      .workstream()?
      .args(["plan", "threads", STREAM])
      .assert()
      .success()
      .stdout(
        predicate::str::contains("THREAD")
          .and(predicate::str::contains("01.01.01"))
          .and(predicate::str::contains("Boot")),
      );
    Ok(())
  })
}

#[test]
fn add_stage_and_batch_extend_the_plan() -> Result<()> {
  TestEnv::run(|env| -> Result<()> {
    let path = env.write_plan(PLAN)?;
    env
      .workstream()?
      .args(["plan", "add-stage", STREAM, "Launch"])
      .assert()
      .success()
      .stdout(predicate::str::contains("Added stage 2"));
    env
      .workstream()?
      .args(["plan", "add-batch", STREAM, "1", "Wire"])
      .assert()
      .success();

    let text = fs::read_to_string(&path)?;
    assert!(text.contains("### Stage 2: Launch"));
    assert!(text.contains("##### Batch 02: Wire"));
    assert!(text.find("### Stage 2: Launch") < text.find("## References"));

    env
      .workstream()?
      .args(["plan", "validate", STREAM])
      .assert()
      .success()
      .stdout(predicate::str::contains("2 stage(s), 4 thread(s)"));

    env
      .workstream()?
      .args(["plan", "add-batch", STREAM, "7", "Nope"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("stage 7 not found"));
    Ok(())
  })
}

#[test]
fn prompt_renders_the_thread_context() -> Result<()> {
  TestEnv::run(|env| -> Result<()> {
    env.write_plan(PLAN)?;
    env
      .workstream()?
      .args(["prompt", STREAM, "1.1.1"])
      .assert()
      .success()
      .stdout(
        predicate::str::contains("# Plan: Payments")
          .and(predicate::str::contains("Set things up."))
          .and(predicate::str::contains("boot the app")),
      );
    env
      .workstream()?
      .args(["prompt", STREAM, "01.01.09"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("thread 01.01.09 not found"));
    Ok(())
  })
}
