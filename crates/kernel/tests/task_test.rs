#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for install, upgrade and uninstall tasks.
//!
//! ## Test Coverage
//!
//! - Planning, confirmation summaries and rejection messages
//! - Single pending-task slot semantics, including requests made while a
//!   confirmed task is still executing
//! - Installed packages, versioned or not, need no operation
//! - Execution order, partial failure and reload behavior
//! - Self-protection and uninstall dependency warnings

mod common;

use common::{SELF_ID, TestEnv, TestEnvBuilder, ids};
use mpm_kernel::plugin::PluginError;
use mpm_kernel::plugin::gate::Action;
use mpm_kernel::task::{Confirmation, TaskState};
use mpm_test_utils::assert::{not_replied, replied};
use mpm_test_utils::{DOWNLOAD_BASE, test_plugin};

async fn confirm(env: &TestEnv) -> TaskState {
    match env.session.confirm(&env.reply) {
        Confirmation::Started(handle) => handle.await.unwrap(),
        Confirmation::NothingToConfirm | Confirmation::Busy => panic!("expected a pending task"),
    }
}

#[tokio::test]
async fn confirm_without_pending_task() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")]).build();

    let outcome = env.session.confirm(&env.reply);
    assert!(matches!(outcome, Confirmation::NothingToConfirm));
    assert_eq!(env.messages(), vec!["Nothing to confirm".to_string()]);
    assert!(env.log.events().is_empty());
    assert!(!env.session.tasks().has_pending());
}

#[tokio::test]
async fn install_plugin_with_missing_package() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0").requires("foo>=1.0")]).build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    assert_eq!(env.session.tasks().pending_action(), Some(Action::Install));

    let messages = env.messages();
    replied(&messages, "plugins: a");
    replied(&messages, "packages: foo");
    assert!(env.log.events().is_empty(), "planning must not have side effects");

    let state = confirm(&env).await;
    assert_eq!(state, TaskState::Succeeded);
    assert!(!env.session.tasks().has_pending());
    assert_eq!(
        env.log.events(),
        vec![
            format!("download {DOWNLOAD_BASE}/a/a-v1.0.mcdr -> /plugins/a-v1.0.mcdr"),
            "record a 1.0".to_string(),
            "pip install foo".to_string(),
            "reload".to_string(),
        ]
    );
}

#[tokio::test]
async fn installed_packages_need_no_operation() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")
        .requires("requests>=2.0")
        .requires("pytz>=2023.3")
        .requires("colorama")])
    .packages(|p| p.with("requests", "2.31.0").unversioned("pytz"))
    .build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    let messages = env.messages();
    replied(&messages, "packages: colorama");
    not_replied(&messages, "requests");
    not_replied(&messages, "pytz");

    assert_eq!(confirm(&env).await, TaskState::Succeeded);
    let pip: Vec<String> = env
        .log
        .events()
        .into_iter()
        .filter(|e| e.starts_with("pip"))
        .collect();
    assert_eq!(pip, vec!["pip install colorama"]);
}

#[tokio::test]
async fn outdated_dependency_is_upgraded_in_place() {
    let env = TestEnvBuilder::new(&[
        test_plugin("a", "1.0").depends_on("b", ">=2.0"),
        test_plugin("b", "2.0"),
    ])
    .runtime(|r| r.with_plugin("b", "1.0"))
    .build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    replied(&env.messages(), "plugins: a, b (upgrade)");

    assert_eq!(confirm(&env).await, TaskState::Succeeded);
    let events = env.log.events();
    assert_eq!(
        events[2..5],
        [
            format!("download {DOWNLOAD_BASE}/b/b-v2.0.mcdr -> /plugins/b-v2.0.mcdr.temp"),
            "remove /plugins/b.mcdr".to_string(),
            "rename /plugins/b-v2.0.mcdr.temp -> /plugins/b-v2.0.mcdr".to_string(),
        ]
    );
}

#[tokio::test]
async fn install_of_installed_up_to_date_plugin_is_nothing_to_do() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")])
        .runtime(|r| r.with_plugin("a", "1.0"))
        .build();

    let err = env
        .session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap_err();
    assert!(matches!(err, PluginError::NothingToDo));

    let messages = env.messages();
    replied(&messages, "Plugin 'a' is already installed");
    replied(&messages, "Plugin 'a' is already up to date");
    replied(&messages, "nothing to do");
    assert!(!env.session.tasks().has_pending());
}

#[tokio::test]
async fn install_of_outdated_plugin_escalates_to_upgrade() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.1"), test_plugin("b", "1.0")])
        .runtime(|r| r.with_plugin("a", "1.0"))
        .build();

    env.session
        .plan_install(&ids(&["a", "b"]), false, env.reply_sink())
        .unwrap();

    let messages = env.messages();
    replied(&messages, "A newer version of 'a' is available: 1.1");
    replied(&messages, "to upgrade a, b");
    replied(&messages, "plugins: a (upgrade), b (upgrade)");
    assert_eq!(env.session.tasks().pending_action(), Some(Action::Upgrade));
}

#[tokio::test]
async fn upgrade_rejects_plugins_that_are_not_installed() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")]).build();

    let err = env
        .session
        .plan_install(&ids(&["a"]), true, env.reply_sink())
        .unwrap_err();
    assert!(matches!(err, PluginError::NotInstalled { .. }));
    assert_eq!(env.messages(), vec!["plugin 'a' is not installed".to_string()]);
}

#[tokio::test]
async fn unknown_plugin_is_rejected_with_one_line() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")]).build();

    let err = env
        .session
        .plan_install(&ids(&["zeta"]), false, env.reply_sink())
        .unwrap_err();
    assert!(matches!(err, PluginError::UnknownPlugin { .. }));
    let messages = env.messages();
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].contains('\n'));
}

#[tokio::test]
async fn unknown_transitive_dependency_rejects_task() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0").depends_on("ghost", "*")]).build();

    let err = env
        .session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap_err();
    assert!(matches!(err, PluginError::UnknownPlugin { .. }));
    replied(&env.messages(), "plugin 'ghost' is not in the catalog");
    assert!(!env.session.tasks().has_pending());
}

#[tokio::test]
async fn plugin_manager_cannot_install_itself() {
    let env = TestEnvBuilder::new(&[test_plugin(SELF_ID, "1.0"), test_plugin("a", "1.0")]).build();

    let err = env
        .session
        .plan_install(&ids(&[SELF_ID]), false, env.reply_sink())
        .unwrap_err();
    assert!(matches!(err, PluginError::SelfTargetRejected { .. }));

    env.reply.clear();
    env.session
        .plan_install(&ids(&[SELF_ID, "a"]), false, env.reply_sink())
        .unwrap();
    let messages = env.messages();
    replied(&messages, "plugins: a");
    not_replied(&messages, SELF_ID);
}

#[tokio::test]
async fn new_submit_replaces_pending_task() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0"), test_plugin("b", "1.0")])
        .runtime(|r| r.with_plugin("b", "1.0"))
        .build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    env.session
        .plan_uninstall(&ids(&["b"]), env.reply_sink())
        .unwrap();
    assert_eq!(env.session.tasks().pending_action(), Some(Action::Uninstall));

    assert_eq!(confirm(&env).await, TaskState::Succeeded);
    let events = env.log.events();
    assert!(events.iter().all(|e| !e.starts_with("download")));
    assert_eq!(events, vec!["unload b", "remove /plugins/b.mcdr", "reload"]);
}

#[tokio::test]
async fn requests_wait_for_the_executing_task() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0"), test_plugin("b", "1.0")]).build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    let Confirmation::Started(handle) = env.session.confirm(&env.reply) else {
        panic!("expected the task to start");
    };
    assert!(env.session.tasks().is_executing());

    env.reply.clear();
    let err = env
        .session
        .plan_install(&ids(&["b"]), false, env.reply_sink())
        .unwrap_err();
    assert!(matches!(err, PluginError::TaskRunning));
    assert_eq!(
        env.messages(),
        vec!["another task is still running, wait for it to finish".to_string()]
    );
    assert!(matches!(env.session.confirm(&env.reply), Confirmation::Busy));

    assert_eq!(handle.await.unwrap(), TaskState::Succeeded);
    assert!(!env.session.tasks().is_executing());

    env.session
        .plan_install(&ids(&["b"]), false, env.reply_sink())
        .unwrap();
    assert!(env.session.tasks().has_pending());
}

#[tokio::test]
async fn rejected_request_clears_pending_task() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")]).build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    assert!(env.session.tasks().has_pending());

    assert!(env.session.plan_uninstall(&ids(&["a"]), env.reply_sink()).is_err());
    assert!(!env.session.tasks().has_pending());
}

#[tokio::test]
async fn failed_operation_does_not_stop_the_batch() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")
        .requires("broken")
        .requires("fine")])
    .executor(|e| e.failing_on("broken"))
    .build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    assert_eq!(confirm(&env).await, TaskState::PartiallyFailed);

    let events = env.log.events();
    assert!(events.contains(&"pip install fine".to_string()));
    assert!(!events.contains(&"reload".to_string()));

    let messages = env.messages();
    replied(&messages, "package 'broken': pip exited with status 1");
    replied(&messages, "1 of 3 operations failed");
    assert!(!env.session.tasks().has_pending());
}

#[tokio::test]
async fn missing_release_fails_that_operation() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0").without_release()]).build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    assert_eq!(confirm(&env).await, TaskState::PartiallyFailed);
    replied(&env.messages(), "plugin 'a': no release available");
}

#[tokio::test]
async fn asset_name_with_path_fails_that_operation() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0").with_asset("../a.mcdr")]).build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    assert_eq!(confirm(&env).await, TaskState::PartiallyFailed);
    replied(&env.messages(), "invalid asset file name '../a.mcdr'");
    assert!(env.log.events().iter().all(|e| !e.starts_with("download")));
}

#[tokio::test]
async fn download_template_rewrites_urls() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")])
        .download_template("https://mirror.invalid/?u={url}")
        .build();

    env.session
        .plan_install(&ids(&["a"]), false, env.reply_sink())
        .unwrap();
    confirm(&env).await;
    assert!(env.log.events()[0].starts_with(&format!(
        "download https://mirror.invalid/?u={DOWNLOAD_BASE}/a/"
    )));
}

#[tokio::test]
async fn uninstall_warns_about_external_dependents() {
    let env = TestEnvBuilder::new(&[
        test_plugin("a", "1.0").depends_on("b", "*"),
        test_plugin("b", "1.0"),
    ])
    .runtime(|r| r.with_plugin("a", "1.0").with_plugin("b", "1.0"))
    .build();

    env.session
        .plan_uninstall(&ids(&["b"]), env.reply_sink())
        .unwrap();
    replied(&env.messages(), "Warning: these plugins depend on 'b': a");

    assert_eq!(confirm(&env).await, TaskState::Succeeded);
    assert_eq!(
        env.log.events(),
        vec!["unload b", "remove /plugins/b.mcdr", "reload"]
    );
}

#[tokio::test]
async fn uninstall_removes_dependents_first() {
    let env = TestEnvBuilder::new(&[
        test_plugin("a", "1.0").depends_on("b", "*"),
        test_plugin("b", "1.0").depends_on("c", "*"),
        test_plugin("c", "1.0"),
    ])
    .runtime(|r| {
        r.with_plugin("a", "1.0")
            .with_plugin("b", "1.0")
            .with_plugin("c", "1.0")
    })
    .build();

    env.session
        .plan_uninstall(&ids(&["c", "a", "b"]), env.reply_sink())
        .unwrap();
    let messages = env.messages();
    replied(&messages, "will be uninstalled: a, b, c");
    not_replied(&messages, "Warning");

    confirm(&env).await;
    let unloads: Vec<String> = env
        .log
        .events()
        .into_iter()
        .filter(|e| e.starts_with("unload"))
        .collect();
    assert_eq!(unloads, vec!["unload a", "unload b", "unload c"]);
}

#[tokio::test]
async fn uninstall_failure_is_reported_and_batch_continues() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0"), test_plugin("b", "1.0")])
        .runtime(|r| {
            r.with_plugin("a", "1.0")
                .with_plugin("b", "1.0")
                .failing_unload("a")
        })
        .build();

    env.session
        .plan_uninstall(&ids(&["a", "b"]), env.reply_sink())
        .unwrap();
    assert_eq!(confirm(&env).await, TaskState::PartiallyFailed);

    assert_eq!(
        env.log.events(),
        vec!["unload b", "remove /plugins/b.mcdr", "reload"]
    );
    replied(&env.messages(), "plugin 'a': plugin is busy");
}

#[tokio::test]
async fn plugin_manager_cannot_uninstall_itself() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")])
        .runtime(|r| r.with_plugin(SELF_ID, "1.0").with_plugin("a", "1.0"))
        .build();

    let err = env
        .session
        .plan_uninstall(&ids(&[SELF_ID]), env.reply_sink())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("plugin '{SELF_ID}' cannot uninstall itself")
    );

    env.session
        .plan_uninstall(&ids(&["a", SELF_ID]), env.reply_sink())
        .unwrap();
    confirm(&env).await;
    assert!(env.log.events().iter().all(|e| !e.contains(SELF_ID)));
}

#[tokio::test]
async fn self_protection_does_not_need_the_manager_loaded() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "1.0")])
        .runtime(|r| r.with_plugin("a", "1.0"))
        .build();

    let err = env
        .session
        .plan_install(&ids(&[SELF_ID]), true, env.reply_sink())
        .unwrap_err();
    assert!(matches!(err, PluginError::SelfTargetRejected { .. }));
    let err = env
        .session
        .plan_uninstall(&ids(&[SELF_ID]), env.reply_sink())
        .unwrap_err();
    assert!(matches!(err, PluginError::SelfTargetRejected { .. }));

    env.session
        .plan_uninstall(&ids(&["a", SELF_ID]), env.reply_sink())
        .unwrap();
    replied(&env.messages(), "will be uninstalled: a");
    assert_eq!(confirm(&env).await, TaskState::Succeeded);
}

#[tokio::test]
async fn check_updates_lists_outdated_plugins() {
    let env = TestEnvBuilder::new(&[test_plugin("a", "2.0"), test_plugin("b", "1.0")])
        .runtime(|r| r.with_plugin("a", "1.5").with_plugin("b", "1.0"))
        .build();

    let outdated = env.session.check_updates(&env.reply);
    assert_eq!(outdated.len(), 1);
    replied(&env.messages(), "a 1.5 -> 2.0");
}
