#![cfg(unix)]

use std::thread;
use std::time::Duration;

use code_agent::runtime::{RuntimeOptions, LOADING_COMPLETE};
use model_backend::{ConversationMessage, Role};
use model_backend_mock::ScriptedBackend;
use pretty_assertions::assert_eq;

mod support;

use support::{sh_executor, Harness};

#[test]
fn block_runs_after_idle_and_result_is_fed_back() {
    let harness = Harness::started(
        ScriptedBackend::from_replies(["Run this:\n```sh\necho hi\n```\n", "Got it.\n"]),
        sh_executor(),
    );

    harness.runtime.submit("say hi").expect("submit");
    harness.wait_for_history(4);

    let history = harness.runtime.history();
    assert_eq!(
        history[2],
        ConversationMessage::user("Execution succeeded:\nhi\n\n")
    );
    assert_eq!(history[3].role, Role::Assistant);
    assert_eq!(history[3].content, "Got it.\n");

    let output = harness.terminal.plain_output();
    assert!(output.starts_with(&format!("{LOADING_COMPLETE}\n")), "{output}");
    assert!(output.contains("Run this:\necho hi\n\n"), "{output}");
    assert!(output.contains("Execution succeeded:\nhi\n\n"), "{output}");
    assert!(output.ends_with("Got it.\n> "), "{output}");
}

#[test]
fn all_successful_reports_are_concatenated() {
    let harness = Harness::started(
        ScriptedBackend::from_replies([
            "```bash\necho one\n```\nand\n```shell\necho two\n```\n",
            "ok\n",
        ]),
        sh_executor(),
    );

    harness.runtime.submit("go").expect("submit");
    harness.wait_for_history(4);

    assert_eq!(
        harness.runtime.history()[2].content,
        "Execution succeeded:\none\n\nExecution succeeded:\ntwo\n\n"
    );
}

#[test]
fn trailing_failure_is_the_only_feedback() {
    let harness = Harness::started(
        ScriptedBackend::from_replies([
            "```sh\necho one\n```\n```sh\necho bad >&2; exit 2\n```\n",
            "fixing\n",
        ]),
        sh_executor(),
    );

    harness.runtime.submit("go").expect("submit");
    harness.wait_for_history(4);

    assert_eq!(
        harness.runtime.history()[2].content,
        "Execution failed: bad\n\n"
    );
    let output = harness.terminal.plain_output();
    assert!(output.contains("Execution succeeded:\none\n\n"), "{output}");
    assert!(output.contains("Execution failed: bad\n\n"), "{output}");
}

#[test]
fn fences_split_across_chunks_still_run() {
    let harness = Harness::started(
        ScriptedBackend::new(vec![
            vec![
                "``".to_string(),
                "`s".to_string(),
                "h\necho sp".to_string(),
                "lit\n`".to_string(),
                "``\n".to_string(),
            ],
            vec!["done\n".to_string()],
        ]),
        sh_executor(),
    );

    harness.runtime.submit("go").expect("submit");
    harness.wait_for_history(4);

    assert_eq!(
        harness.runtime.history()[2].content,
        "Execution succeeded:\nsplit\n\n"
    );
}

#[test]
fn blocks_without_a_runnable_language_are_only_displayed() {
    let harness = Harness::started(
        ScriptedBackend::from_replies(["```rust\nfn main() {}\n```\n"]),
        sh_executor(),
    );

    harness.runtime.submit("show rust").expect("submit");
    thread::sleep(Duration::from_millis(300));

    assert_eq!(harness.runtime.history().len(), 2);
    assert!(!harness.runtime.is_busy());
    assert!(harness.terminal.plain_output().contains("fn main() {}\n"));
}

#[test]
fn execution_waits_for_the_stream_to_go_quiet() {
    let options = RuntimeOptions {
        idle_threshold: Duration::from_millis(300),
        poll_interval: Duration::from_millis(5),
        render_prompt: true,
    };
    let backend = ScriptedBackend::from_replies([
        "```sh\necho early\n```\nthe reply keeps going for a few more words\n",
        "thanks\n",
    ])
    .with_token_delay(Duration::from_millis(10));
    let harness = Harness::with_options(backend, sh_executor(), options).start();

    harness.runtime.submit("go").expect("submit");
    harness.wait_for_history(4);

    let output = harness.terminal.plain_output();
    let tail = output
        .find("a few more words")
        .expect("reply tail rendered");
    let report = output
        .find("Execution succeeded:\nearly")
        .expect("report rendered");
    assert!(tail < report, "{output}");
}
