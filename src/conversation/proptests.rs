//! Property-based tests for the conversation state machine

use super::progress::Streak;
use super::*;
use crate::transport::ServerResponse;
use chrono::{Days, NaiveDate};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Send(String),
    Respond(String, Option<String>),
    SwitchMode(ConversationMode),
    Reset,
}

fn arb_mode() -> impl Strategy<Value = ConversationMode> {
    prop_oneof![
        Just(ConversationMode::Solve),
        Just(ConversationMode::Explain),
        Just(ConversationMode::Quiz),
        Just(ConversationMode::Exam),
    ]
}

fn arb_reply_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Correct! Well done.".to_string()),
        Just("Not quite, try again.".to_string()),
        Just("Here is a limits problem.".to_string()),
        Just("RESULT: INCORRECT".to_string()),
        "[a-zA-Z ]{0,40}",
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => "[a-zA-Z0-9 ]{0,30}".prop_map(Op::Send),
        3 => (arb_reply_text(), proptest::option::of("[a-z0-9]{4}"))
            .prop_map(|(text, sid)| Op::Respond(text, sid)),
        1 => arb_mode().prop_map(Op::SwitchMode),
        1 => Just(Op::Reset),
    ]
}

fn exam_machine() -> ConversationStateMachine {
    let mut m = ConversationStateMachine::new(Preferences::default());
    m.set_mode(ConversationMode::Exam);
    m
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// exam_answer is set exactly when an answer was being awaited
    #[test]
    fn prop_exam_answer_tracks_awaiting_flag(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut m = exam_machine();
        for op in ops {
            match op {
                Op::Send(text) => {
                    let awaiting = m.state().awaiting_exam_answer;
                    let payload = m.build_payload(&UserInput::text(text));
                    let expected = m.mode() == ConversationMode::Exam && awaiting;
                    prop_assert_eq!(payload.exam_answer, expected);
                }
                Op::Respond(text, sid) => {
                    let mode = m.mode();
                    m.apply_response(mode, &ServerResponse::new(text, sid.as_deref()));
                }
                Op::SwitchMode(mode) => m.set_mode(mode),
                Op::Reset => m.reset(),
            }
        }
    }

    /// Exam responses alternate pose/grade and count one total per cycle
    #[test]
    fn prop_exam_cycle_alternates(replies in proptest::collection::vec(arb_reply_text(), 0..30)) {
        let mut m = exam_machine();
        for (i, text) in replies.iter().enumerate() {
            let before = m.state().awaiting_exam_answer;
            prop_assert_eq!(before, i % 2 == 1);
            let delta = m.apply_response(ConversationMode::Exam, &ServerResponse::new(text.clone(), None));
            prop_assert_eq!(m.state().awaiting_exam_answer, !before);
            prop_assert_eq!(delta.exam_graded.is_some(), before);
            prop_assert_eq!(m.state().exam_total as usize, (i + 1) / 2);
            prop_assert!(m.state().exam_correct <= m.state().exam_total);
        }
    }

    /// Covered topics only ever grow, resets included
    #[test]
    fn prop_topic_coverage_is_monotonic(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut m = ConversationStateMachine::new(Preferences::default());
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut seen = m.progress().covered.clone();
        for op in ops {
            match op {
                Op::Send(text) => {
                    m.record_user_activity(&text, today);
                    m.build_payload(&UserInput::text(text));
                }
                Op::Respond(text, sid) => {
                    let mode = m.mode();
                    m.apply_response(mode, &ServerResponse::new(text, sid.as_deref()));
                }
                Op::SwitchMode(mode) => m.set_mode(mode),
                Op::Reset => m.reset(),
            }
            prop_assert!(seen.is_subset(&m.progress().covered));
            seen = m.progress().covered.clone();
        }
    }

    /// The session id follows the most recent response that carried one
    #[test]
    fn prop_session_id_follows_responses(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut m = ConversationStateMachine::new(Preferences::default());
        let mut expected: Option<String> = None;
        for op in ops {
            match op {
                Op::Send(text) => {
                    let payload = m.build_payload(&UserInput::text(text));
                    prop_assert_eq!(&payload.session_id, &expected);
                }
                Op::Respond(text, sid) => {
                    let mode = m.mode();
                    m.apply_response(mode, &ServerResponse::new(text, sid.as_deref()));
                    if sid.is_some() {
                        expected = sid;
                    }
                }
                Op::SwitchMode(mode) => m.set_mode(mode),
                Op::Reset => {
                    m.reset();
                    expected = None;
                }
            }
            prop_assert_eq!(m.session_id(), expected.as_deref());
        }
    }

    /// Streak never exceeds the number of distinct active days
    #[test]
    fn prop_streak_bounded_by_active_days(gaps in proptest::collection::vec(0u64..4, 1..30)) {
        let mut streak = Streak::default();
        let mut day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut run = 0u32;
        for gap in gaps {
            day = day.checked_add_days(Days::new(gap)).unwrap();
            let first = streak.last_active.is_none();
            streak.record_activity(day);
            run = match gap {
                _ if first => 1,
                0 => run,
                1 => run + 1,
                _ => 1,
            };
            prop_assert_eq!(streak.count, run);
            prop_assert_eq!(streak.last_active, Some(day));
        }
    }
}
