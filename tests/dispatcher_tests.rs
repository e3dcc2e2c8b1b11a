
use std::collections::BTreeMap;

use swc_dispatch::confirmation::TicketState;
use swc_dispatch::node::{Command, Event, EventKind};
use swc_dispatch::platform::{Member, MessageRef};
use swc_dispatch::reports::{ReportKind, ReviewAction, ReviewState};
use test_harness::{lead, worker, TestStack, GUILD, LOG_CHANNEL, WORK_CHANNEL};

fn event(actor: Member, kind: EventKind) -> Event {
    Event {
        guild_id: GUILD,
        channel_id: WORK_CHANNEL,
        actor,
        kind,
    }
}

fn command(actor: Member, command: Command) -> Event {
    event(actor, EventKind::Command(command))
}

fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn source_message(id: u64, author: u64) -> MessageRef {
    MessageRef {
        author_id: Some(author),
        ..MessageRef::new(GUILD, WORK_CHANNEL, id)
    }
}

async fn queued_ids(stack: &TestStack) -> Vec<u64> {
    stack
        .dispatcher
        .coordinator()
        .list_queue(&lead(900), 100)
        .await
        .unwrap()
        .entries
        .iter()
        .map(|e| e.worker_id)
        .collect()
}

#[tokio::test]
async fn test_denials_are_private() {
    let stack = TestStack::new();
    stack
        .dispatcher
        .dispatch(command(worker(30), Command::Resetqueue))
        .await;

    let private = stack.messenger.ephemerals_to(30);
    assert_eq!(private, vec!["You need a coordinator role to do that".to_string()]);
    assert!(stack.messenger.posts_in(WORK_CHANNEL).is_empty());
}

#[tokio::test]
async fn test_available_command_defaults_time_block() {
    let stack = TestStack::new();
    let reply = stack
        .dispatcher
        .handle(command(worker(10), Command::Available { time_block: None }))
        .await;
    assert_eq!(reply.as_deref(), Some("You are #1 in the queue."));

    let listing = stack
        .dispatcher
        .handle(command(lead(900), Command::Queue { limit: None }))
        .await
        .unwrap();
    assert!(listing.contains("<@10> (Unspecified)"));
}

#[tokio::test]
async fn test_plain_available_message_joins_queue() {
    let stack = TestStack::new();
    let message = source_message(500, 10);
    let reply = stack
        .dispatcher
        .handle(event(
            worker(10),
            EventKind::Message {
                message: message.clone(),
                content: "  AVAILABLE \n".to_string(),
            },
        ))
        .await;

    assert_eq!(reply.as_deref(), Some("You are #1 in the queue."));
    assert_eq!(stack.messenger.reactions_on(500), vec!["✅".to_string()]);
    assert!(stack.messenger.posts_in(WORK_CHANNEL).is_empty());

    let snapshot = stack
        .dispatcher
        .coordinator()
        .list_queue(&lead(900), 10)
        .await
        .unwrap();
    assert_eq!(snapshot.entries[0].time_block, "Unspecified");
    assert_eq!(snapshot.entries[0].origin_reference, Some(message.jump_url()));
}

#[tokio::test]
async fn test_other_messages_are_ignored() {
    let stack = TestStack::new();
    let reply = stack
        .dispatcher
        .handle(event(
            worker(10),
            EventKind::Message {
                message: source_message(500, 10),
                content: "I am available".to_string(),
            },
        ))
        .await;
    assert!(reply.is_none());
    assert!(queued_ids(&stack).await.is_empty());
}

#[tokio::test]
async fn test_reaction_by_coordinator_assigns_author() {
    let stack = TestStack::new();
    stack
        .dispatcher
        .handle(command(worker(10), Command::Available { time_block: None }))
        .await;
    stack.messenger.clear();

    let reply = stack
        .dispatcher
        .handle(event(
            lead(900),
            EventKind::Reaction {
                message: source_message(600, 10),
                author: worker(10),
                emoji: "🇭".to_string(),
            },
        ))
        .await
        .unwrap();

    assert!(reply.contains("Assigned **HP FILE** to worker-10"));
    assert!(reply.contains("Removed from the queue."));
    assert_eq!(stack.messenger.dms_to(10).len(), 1);
    assert_eq!(stack.messenger.reactions_on(600), vec!["✅".to_string()]);
    assert!(queued_ids(&stack).await.is_empty());
}

#[tokio::test]
async fn test_reaction_by_non_coordinator_is_ignored() {
    let stack = TestStack::new();
    let reply = stack
        .dispatcher
        .handle(event(
            worker(11),
            EventKind::Reaction {
                message: source_message(600, 10),
                author: worker(10),
                emoji: "QB".to_string(),
            },
        ))
        .await;
    assert!(reply.is_none());
    assert!(stack.messenger.sent().is_empty());
}

#[tokio::test]
async fn test_reaction_on_bot_message_is_ignored() {
    let stack = TestStack::new();
    let reply = stack
        .dispatcher
        .handle(event(
            lead(900),
            EventKind::Reaction {
                message: source_message(600, 2),
                author: Member::new(2, "other-bot").bot(),
                emoji: "QB".to_string(),
            },
        ))
        .await;
    assert!(reply.is_none());
    assert!(stack.messenger.sent().is_empty());
}

#[tokio::test]
async fn test_own_events_are_ignored() {
    let stack = TestStack::new();
    let reply = stack
        .dispatcher
        .handle(command(Member::new(1, "swc-bot").bot(), Command::Optout))
        .await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_confirm_button_needs_file_name() {
    let stack = TestStack::new();
    let result = stack
        .dispatcher
        .coordinator()
        .assign(
            &lead(900),
            &worker(20),
            swc_dispatch::scheduler::Origin::new(GUILD, WORK_CHANNEL),
            swc_dispatch::scheduler::AssignRequest::new(swc_dispatch::scheduler::FileType::QuartrLive),
        )
        .await
        .unwrap();
    let confirm_id = stack.messenger.posts_in(WORK_CHANNEL)[0].controls[0]
        .custom_id
        .clone();

    let reply = stack
        .dispatcher
        .handle(event(
            worker(20),
            EventKind::Control {
                custom_id: confirm_id.clone(),
                input: None,
            },
        ))
        .await;
    assert_eq!(reply.as_deref(), Some("Missing required field: File name"));

    let reply = stack
        .dispatcher
        .handle(event(
            worker(20),
            EventKind::Control {
                custom_id: confirm_id,
                input: Some("ACME live".to_string()),
            },
        ))
        .await;
    assert_eq!(reply.as_deref(), Some("Thanks, receipt confirmed."));
    assert_eq!(
        stack.dispatcher.coordinator().tracker().state(result.ticket_id).await,
        Some(TicketState::Confirmed {
            file_name: "ACME live".to_string()
        })
    );
}

#[tokio::test]
async fn test_unknown_control_is_stale() {
    let stack = TestStack::new();
    let reply = stack
        .dispatcher
        .handle(event(
            worker(20),
            EventKind::Control {
                custom_id: "mystery".to_string(),
                input: None,
            },
        ))
        .await
        .unwrap();
    assert!(reply.starts_with("Referenced message no longer exists"));
}

#[tokio::test]
async fn test_tat_timer_command() {
    let stack = TestStack::new();
    let reply = stack
        .dispatcher
        .handle(command(
            worker(10),
            Command::TatTimer {
                file_type: "HP FILE".to_string(),
                duration: "00:45:00".to_string(),
            },
        ))
        .await
        .unwrap();
    assert!(reply.contains("FR TAT: `N/A`"));
    assert!(reply.contains("SV TAT: `N/A`"));
    assert!(reply.contains("Overall TAT: `01:30:00`"));

    let reply = stack
        .dispatcher
        .handle(command(
            worker(10),
            Command::TatTimer {
                file_type: "QB".to_string(),
                duration: "1:2:3:4".to_string(),
            },
        ))
        .await
        .unwrap();
    assert!(reply.starts_with("Invalid duration"));
}

#[tokio::test]
async fn test_assign_command_rejects_unknown_file_type() {
    let stack = TestStack::new();
    let reply = stack
        .dispatcher
        .handle(command(
            lead(900),
            Command::Assign {
                worker: worker(20),
                file_type: "PODCAST".to_string(),
                file_name: None,
                duration: None,
            },
        ))
        .await
        .unwrap();
    assert_eq!(reply, "Unknown file type \"PODCAST\"");
    assert!(stack.messenger.posts_in(WORK_CHANNEL).is_empty());
}

#[tokio::test]
async fn test_set_log_channel_uses_current_channel() {
    let stack = TestStack::new();
    stack
        .dispatcher
        .handle(Event {
            guild_id: GUILD,
            channel_id: LOG_CHANNEL,
            actor: lead(900),
            kind: EventKind::Command(Command::SetLogChannel),
        })
        .await;
    assert_eq!(
        stack.dispatcher.coordinator().audit().channel_for(GUILD).await,
        Some(LOG_CHANNEL)
    );
}

#[tokio::test]
async fn test_ask_for_update_pings_worker() {
    let stack = TestStack::with_log_channel().await;
    let reply = stack
        .dispatcher
        .handle(command(worker(11), Command::AskForUpdate { worker: worker(20) }))
        .await;
    assert_eq!(reply.as_deref(), Some("You need a coordinator role to do that"));
    assert!(stack.messenger.sent().is_empty());

    let reply = stack
        .dispatcher
        .handle(command(lead(900), Command::AskForUpdate { worker: worker(20) }))
        .await;
    assert_eq!(reply.as_deref(), Some("Asked worker-20 for an update."));

    let public = stack.messenger.posts_in(WORK_CHANNEL);
    assert_eq!(public.len(), 1);
    assert!(public[0].content.contains("<@20>, <@900> is asking for an update"));
    assert_eq!(stack.messenger.dms_to(20).len(), 1);
    assert_eq!(stack.messenger.posts_in(LOG_CHANNEL).len(), 1);
}

#[tokio::test]
async fn test_plain_report_is_posted_and_mirrored() {
    let stack = TestStack::with_log_channel().await;
    let reply = stack
        .dispatcher
        .handle(command(
            worker(10),
            Command::Report {
                kind: ReportKind::TatDelay,
                fields: fields(&[
                    ("file_name", "ACME Q3"),
                    ("expected_delay", "20 minutes"),
                    ("reason", "Crosstalk"),
                ]),
            },
        ))
        .await;
    assert_eq!(reply.as_deref(), Some("Report submitted."));

    let posts = stack.messenger.posts_in(WORK_CHANNEL);
    assert_eq!(posts.len(), 1);
    assert!(posts[0].content.contains("**Expected delay:** 20 minutes"));
    assert!(posts[0].controls.is_empty());
    let logs = stack.messenger.posts_in(LOG_CHANNEL);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].content, posts[0].content);
}

#[tokio::test]
async fn test_invalid_report_is_rejected_privately() {
    let stack = TestStack::new();
    stack
        .dispatcher
        .dispatch(command(
            worker(10),
            Command::Report {
                kind: ReportKind::Revert,
                fields: fields(&[("file_name", "ACME Q3")]),
            },
        ))
        .await;
    assert_eq!(
        stack.messenger.ephemerals_to(10),
        vec!["Missing required field: Revert reason".to_string()]
    );
    assert!(stack.messenger.posts_in(WORK_CHANNEL).is_empty());
}

#[tokio::test]
async fn test_rework_review_resolves_once() {
    let stack = TestStack::new();
    let filed = stack
        .dispatcher
        .reports()
        .file(
            &worker(10),
            swc_dispatch::scheduler::Origin::new(GUILD, WORK_CHANNEL),
            ReportKind::Rework,
            &fields(&[("file_name", "ACME Q3"), ("details", "Speaker labels wrong")]),
        )
        .await
        .unwrap();
    let review_id = filed.review_id.expect("rework is reviewed");
    let record = stack.messenger.posts_in(WORK_CHANNEL)[0].clone();
    assert_eq!(record.controls.len(), 2);
    let approve = record.controls[0].custom_id.clone();
    let deny = record.controls[1].custom_id.clone();
    assert_eq!(ReviewAction::from_custom_id(&approve).unwrap().review_id, review_id);

    let reply = stack
        .dispatcher
        .handle(event(worker(11), EventKind::Control { custom_id: approve.clone(), input: None }))
        .await;
    assert_eq!(reply.as_deref(), Some("You need a coordinator role to do that"));
    assert_eq!(
        stack.dispatcher.reports().review_state(review_id).await,
        Some(ReviewState::Open)
    );

    let reply = stack
        .dispatcher
        .handle(event(lead(900), EventKind::Control { custom_id: approve, input: None }))
        .await;
    assert_eq!(reply.as_deref(), Some("Marked ✅ Approved."));

    let reply = stack
        .dispatcher
        .handle(event(lead(901), EventKind::Control { custom_id: deny, input: None }))
        .await;
    assert_eq!(reply.as_deref(), Some("This is no longer actionable"));

    assert_eq!(
        stack.dispatcher.reports().review_state(review_id).await,
        Some(ReviewState::Resolved {
            by: 900,
            disposition: "✅ Approved"
        })
    );
    let edits = stack.messenger.edits_of(filed.record.message_id);
    assert_eq!(edits.len(), 1);
    assert!(edits[0].content.ends_with("**Status:** ✅ Approved by <@900>"));
    assert!(edits[0].controls.iter().all(|c| c.disabled));

    let dms = stack.messenger.dms_to(10);
    assert_eq!(dms.len(), 1);
    assert!(dms[0].content.contains("marked ✅ Approved by <@900>"));
}

#[tokio::test]
async fn test_revert_review_on_deleted_record_posts_outcome() {
    let stack = TestStack::new();
    let filed = stack
        .dispatcher
        .reports()
        .file(
            &worker(10),
            swc_dispatch::scheduler::Origin::new(GUILD, WORK_CHANNEL),
            ReportKind::Revert,
            &fields(&[("file_name", "ACME Q3"), ("reason", "Wrong template")]),
        )
        .await
        .unwrap();
    stack.messenger.delete(filed.record.message_id);
    stack.messenger.close_dms(10);

    let action = ReviewAction {
        review_id: filed.review_id.unwrap(),
        decision: swc_dispatch::reports::ReviewDecision::Deny,
    };
    let disposition = stack
        .dispatcher
        .reports()
        .resolve(&lead(900), action)
        .await
        .unwrap();
    assert_eq!(disposition, "📝 Noted");

    let posts = stack.messenger.posts_in(WORK_CHANNEL);
    assert_eq!(posts.len(), 2);
    assert!(posts[1].content.contains("**Status:** 📝 Noted by <@900>"));
}

#[tokio::test(start_paused = true)]
async fn test_resolved_reviews_are_pruned_after_a_day() {
    let stack = TestStack::new();
    let desk = stack.dispatcher.reports();
    let origin = swc_dispatch::scheduler::Origin::new(GUILD, WORK_CHANNEL);
    let rework = fields(&[("file_name", "ACME Q3"), ("details", "Speaker labels wrong")]);

    let resolved = desk
        .file(&worker(10), origin, ReportKind::Rework, &rework)
        .await
        .unwrap()
        .review_id
        .unwrap();
    let open = desk
        .file(&worker(11), origin, ReportKind::Rework, &rework)
        .await
        .unwrap()
        .review_id
        .unwrap();
    desk.resolve(
        &lead(900),
        ReviewAction {
            review_id: resolved,
            decision: swc_dispatch::reports::ReviewDecision::Approve,
        },
    )
    .await
    .unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(23 * 60 * 60)).await;
    desk.file(&worker(12), origin, ReportKind::Rework, &rework)
        .await
        .unwrap();
    assert!(desk.review_state(resolved).await.is_some());

    tokio::time::sleep(std::time::Duration::from_secs(2 * 60 * 60)).await;
    desk.file(&worker(12), origin, ReportKind::Rework, &rework)
        .await
        .unwrap();
    assert_eq!(desk.review_state(resolved).await, None);
    assert_eq!(desk.review_state(open).await, Some(ReviewState::Open));
}

#[tokio::test]
async fn test_run_loop_drains_events_until_closed() {
    let stack = TestStack::new();
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    for id in [10, 11, 12] {
        tx.send(command(worker(id), Command::Available { time_block: None }))
            .await
            .unwrap();
    }
    tx.send(command(worker(11), Command::Optout)).await.unwrap();
    drop(tx);

    stack
        .dispatcher
        .run(rx, tokio_util::sync::CancellationToken::new())
        .await;

    assert_eq!(queued_ids(&stack).await, vec![10, 12]);
    assert_eq!(
        stack.messenger.ephemerals_to(11),
        vec![
            "You are #2 in the queue.".to_string(),
            "You have been removed from the queue.".to_string()
        ]
    );
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let stack = TestStack::new();
    let (_tx, rx) = tokio::sync::mpsc::channel::<Event>(8);
    let shutdown = tokio_util::sync::CancellationToken::new();
    shutdown.cancel();
    stack.dispatcher.run(rx, shutdown).await;
}
