//! Per-keystroke reconciliation of the local typing buffer against the room
//! text. Accepted input lands synchronously; network publishing is debounced.

use chrono::{DateTime, Duration, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use typerace_common::metrics;

use crate::timer::Debounce;

/// Trailing-edge window collapsing keystroke bursts into one progress publish.
pub const PUBLISH_DEBOUNCE_MS: i64 = 200;
/// Inactivity window after which the cursor is considered idle.
pub const IDLE_AFTER_MS: i64 = 500;

/// Input gating policy, selected at round start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Every keystroke lands in one buffer; backspace only while an
    /// uncorrected error exists.
    CharStream,
    /// Words commit on space; committed words cannot be edited.
    WordCommitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    Char(char),
    Backspace,
}

/// Translate a terminal key event into a race keystroke. Control chords and
/// navigation keys are not keystrokes; the app layer handles those.
pub fn map_key(key: KeyEvent) -> Option<Keystroke> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    match key.code {
        KeyCode::Char(c) => Some(Keystroke::Char(c)),
        KeyCode::Backspace => Some(Keystroke::Backspace),
        _ => None,
    }
}

#[derive(Debug)]
pub struct Reconciler {
    mode: InputMode,
    /// Cumulative accepted keystrokes since round start.
    typed: String,
    /// Word-committed mode: words locked in so far, with their spaces.
    committed: String,
    words_committed: usize,
    /// Word-committed mode: the word currently being typed.
    word_buffer: String,
    position: usize,
    wrong: Vec<usize>,
    started_at: Option<DateTime<Utc>>,
    idle: bool,
    publish_timer: Debounce,
    idle_timer: Debounce,
}

impl Reconciler {
    pub fn new(mode: InputMode) -> Self {
        Self {
            mode,
            typed: String::new(),
            committed: String::new(),
            words_committed: 0,
            word_buffer: String::new(),
            position: 0,
            wrong: Vec::new(),
            started_at: None,
            idle: true,
            publish_timer: Debounce::new(Duration::milliseconds(PUBLISH_DEBOUNCE_MS)),
            idle_timer: Debounce::new(Duration::milliseconds(IDLE_AFTER_MS)),
        }
    }

    /// Discard all per-round state, abandoning any pending deadlines.
    pub fn reset(&mut self) {
        self.typed.clear();
        self.committed.clear();
        self.words_committed = 0;
        self.word_buffer.clear();
        self.position = 0;
        self.wrong.clear();
        self.started_at = None;
        self.idle = true;
        self.publish_timer.cancel();
        self.idle_timer.cancel();
    }

    pub fn cancel_timers(&mut self) {
        self.publish_timer.cancel();
        self.idle_timer.cancel();
    }

    pub fn typed(&self) -> &str {
        &self.typed
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn wrong_indices(&self) -> &[usize] {
        &self.wrong
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Time since the first accepted keystroke; zero before any input.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        match self.started_at {
            Some(start) => now - start,
            None => Duration::zero(),
        }
    }

    /// Feed one keystroke. Returns true when the buffer changed; rejected
    /// input (past the end, gated backspace, refused word commit) is
    /// swallowed silently.
    pub fn on_key(&mut self, key: Keystroke, canonical: &str, now: DateTime<Utc>) -> bool {
        let accepted = match self.mode {
            InputMode::CharStream => self.apply_char_stream(key, canonical),
            InputMode::WordCommitted => self.apply_word_committed(key, canonical),
        };
        if accepted {
            self.after_accept(canonical, now);
        }
        accepted
    }

    fn apply_char_stream(&mut self, key: Keystroke, canonical: &str) -> bool {
        match key {
            Keystroke::Char(c) => {
                if self.typed.chars().count() >= canonical.chars().count() {
                    return false;
                }
                self.typed.push(c);
                true
            }
            Keystroke::Backspace => {
                // correct characters are committed; only an uncorrected
                // error run may be erased
                if self.wrong.is_empty() {
                    return false;
                }
                self.typed.pop().is_some()
            }
        }
    }

    fn apply_word_committed(&mut self, key: Keystroke, canonical: &str) -> bool {
        match key {
            Keystroke::Char(' ') => {
                let words: Vec<&str> = canonical.split(' ').collect();
                let current = match words.get(self.words_committed) {
                    Some(word) => word,
                    None => return false,
                };
                if self.word_buffer.chars().count() != current.chars().count() {
                    return false;
                }
                if self.words_committed + 1 >= words.len() {
                    // the last word has no trailing space in the text
                    return false;
                }
                self.committed.push_str(&self.word_buffer);
                self.committed.push(' ');
                self.words_committed += 1;
                self.word_buffer.clear();
                true
            }
            Keystroke::Char(c) => {
                let typed_len =
                    self.committed.chars().count() + self.word_buffer.chars().count();
                if typed_len >= canonical.chars().count() {
                    return false;
                }
                self.word_buffer.push(c);
                true
            }
            Keystroke::Backspace => self.word_buffer.pop().is_some(),
        }
    }

    fn after_accept(&mut self, canonical: &str, now: DateTime<Utc>) {
        if self.mode == InputMode::WordCommitted {
            self.typed = format!("{}{}", self.committed, self.word_buffer);
        }
        self.position = metrics::prefix_position(&self.typed, canonical);
        self.wrong = metrics::wrong_indices(&self.typed, canonical);
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.idle = false;
        self.publish_timer.arm(now);
        self.idle_timer.arm(now);
    }

    /// True exactly once when the publish window since the last accepted
    /// keystroke has elapsed.
    pub fn poll_publish(&mut self, now: DateTime<Utc>) -> bool {
        self.publish_timer.fire(now)
    }

    /// Flip to idle once the inactivity window elapses; true on transition.
    pub fn poll_idle(&mut self, now: DateTime<Utc>) -> bool {
        if self.idle_timer.fire(now) {
            self.idle = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TEXT: &str = "the cat sat";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn type_str(rec: &mut Reconciler, s: &str, now: DateTime<Utc>) {
        for c in s.chars() {
            rec.on_key(Keystroke::Char(c), TEXT, now);
        }
    }

    #[test]
    fn test_char_stream_optimistic_updates() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        type_str(&mut rec, "the ", t0());
        assert_eq!(rec.typed(), "the ");
        assert_eq!(rec.position(), 4);
        assert!(rec.wrong_indices().is_empty());
    }

    #[test]
    fn test_position_freezes_on_error() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        type_str(&mut rec, "the cit", t0());
        assert_eq!(rec.position(), 5);
        assert_eq!(rec.wrong_indices(), &[5]);
    }

    #[test]
    fn test_rejects_input_past_canonical_length() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        type_str(&mut rec, TEXT, t0());
        assert!(!rec.on_key(Keystroke::Char('x'), TEXT, t0()));
        assert_eq!(rec.typed().chars().count(), TEXT.chars().count());
    }

    #[test]
    fn test_backspace_gated_on_error_presence() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        type_str(&mut rec, "the", t0());
        // no error: committed characters cannot be erased
        assert!(!rec.on_key(Keystroke::Backspace, TEXT, t0()));
        assert_eq!(rec.typed(), "the");

        rec.on_key(Keystroke::Char('x'), TEXT, t0());
        assert_eq!(rec.wrong_indices(), &[3]);
        assert!(rec.on_key(Keystroke::Backspace, TEXT, t0()));
        assert_eq!(rec.typed(), "the");
        // error erased: gate closes again
        assert!(!rec.on_key(Keystroke::Backspace, TEXT, t0()));
    }

    #[test]
    fn test_backspace_erases_through_trailing_matches() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        // the 't' after the bad 'i' matches canonical coincidentally but the
        // error at index 5 keeps the gate open until it is gone
        type_str(&mut rec, "the cit", t0());
        assert!(rec.on_key(Keystroke::Backspace, TEXT, t0()));
        assert!(rec.on_key(Keystroke::Backspace, TEXT, t0()));
        assert_eq!(rec.typed(), "the c");
        assert!(rec.wrong_indices().is_empty());
        assert!(!rec.on_key(Keystroke::Backspace, TEXT, t0()));
    }

    #[test]
    fn test_word_commit_requires_length_match() {
        let mut rec = Reconciler::new(InputMode::WordCommitted);
        type_str(&mut rec, "th", t0());
        // "th" is shorter than "the": space refused, no state change
        assert!(!rec.on_key(Keystroke::Char(' '), TEXT, t0()));
        assert_eq!(rec.typed(), "th");

        rec.on_key(Keystroke::Char('e'), TEXT, t0());
        assert!(rec.on_key(Keystroke::Char(' '), TEXT, t0()));
        assert_eq!(rec.typed(), "the ");
        assert_eq!(rec.position(), 4);
    }

    #[test]
    fn test_word_commit_on_length_not_content() {
        let mut rec = Reconciler::new(InputMode::WordCommitted);
        type_str(&mut rec, "thx", t0());
        // wrong content but matching length still commits
        assert!(rec.on_key(Keystroke::Char(' '), TEXT, t0()));
        assert_eq!(rec.typed(), "thx ");
        assert_eq!(rec.position(), 2);
    }

    #[test]
    fn test_word_backspace_cannot_cross_commit() {
        let mut rec = Reconciler::new(InputMode::WordCommitted);
        type_str(&mut rec, "the", t0());
        rec.on_key(Keystroke::Char(' '), TEXT, t0());
        // live buffer is empty; the committed word is untouchable
        assert!(!rec.on_key(Keystroke::Backspace, TEXT, t0()));
        assert_eq!(rec.typed(), "the ");

        rec.on_key(Keystroke::Char('c'), TEXT, t0());
        assert!(rec.on_key(Keystroke::Backspace, TEXT, t0()));
        assert_eq!(rec.typed(), "the ");
    }

    #[test]
    fn test_word_mode_reconstructs_cumulative_string() {
        let mut rec = Reconciler::new(InputMode::WordCommitted);
        type_str(&mut rec, "the", t0());
        rec.on_key(Keystroke::Char(' '), TEXT, t0());
        type_str(&mut rec, "cat", t0());
        rec.on_key(Keystroke::Char(' '), TEXT, t0());
        type_str(&mut rec, "sat", t0());
        assert_eq!(rec.typed(), TEXT);
        assert_eq!(rec.position(), TEXT.chars().count());
    }

    #[test]
    fn test_word_mode_no_trailing_space_after_last_word() {
        let mut rec = Reconciler::new(InputMode::WordCommitted);
        type_str(&mut rec, "the", t0());
        rec.on_key(Keystroke::Char(' '), TEXT, t0());
        type_str(&mut rec, "cat", t0());
        rec.on_key(Keystroke::Char(' '), TEXT, t0());
        type_str(&mut rec, "sat", t0());
        assert!(!rec.on_key(Keystroke::Char(' '), TEXT, t0()));
        assert_eq!(rec.typed(), TEXT);
    }

    #[test]
    fn test_started_at_set_on_first_accepted_key() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        assert!(rec.started_at().is_none());
        let start = t0();
        rec.on_key(Keystroke::Char('t'), TEXT, start);
        assert_eq!(rec.started_at(), Some(start));
        // later keys do not move it
        rec.on_key(Keystroke::Char('h'), TEXT, start + Duration::seconds(3));
        assert_eq!(rec.started_at(), Some(start));
        assert_eq!(rec.elapsed(start + Duration::seconds(10)), Duration::seconds(10));
    }

    #[test]
    fn test_idle_flips_after_inactivity_window() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        let start = t0();
        assert!(rec.is_idle());
        rec.on_key(Keystroke::Char('t'), TEXT, start);
        assert!(!rec.is_idle());

        assert!(!rec.poll_idle(start + Duration::milliseconds(400)));
        assert!(rec.poll_idle(start + Duration::milliseconds(500)));
        assert!(rec.is_idle());
    }

    #[test]
    fn test_further_input_restarts_idle_window() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        let start = t0();
        rec.on_key(Keystroke::Char('t'), TEXT, start);
        rec.on_key(Keystroke::Char('h'), TEXT, start + Duration::milliseconds(400));
        assert!(!rec.poll_idle(start + Duration::milliseconds(600)));
        assert!(rec.poll_idle(start + Duration::milliseconds(900)));
    }

    #[test]
    fn test_publish_debounce_collapses_bursts() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        let start = t0();
        for (i, c) in "the".chars().enumerate() {
            rec.on_key(
                Keystroke::Char(c),
                TEXT,
                start + Duration::milliseconds(i as i64 * 50),
            );
            assert!(!rec.poll_publish(start + Duration::milliseconds(i as i64 * 50)));
        }
        // window measured from the last keystroke at +100ms
        assert!(!rec.poll_publish(start + Duration::milliseconds(250)));
        assert!(rec.poll_publish(start + Duration::milliseconds(300)));
        // fired once; nothing further without new input
        assert!(!rec.poll_publish(start + Duration::seconds(5)));
    }

    #[test]
    fn test_rejected_input_does_not_arm_publish() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        let start = t0();
        assert!(!rec.on_key(Keystroke::Backspace, TEXT, start));
        assert!(!rec.poll_publish(start + Duration::seconds(1)));
    }

    #[test]
    fn test_reset_clears_state_and_deadlines() {
        let mut rec = Reconciler::new(InputMode::CharStream);
        let start = t0();
        type_str(&mut rec, "the x", start);
        rec.reset();
        assert_eq!(rec.typed(), "");
        assert_eq!(rec.position(), 0);
        assert!(rec.wrong_indices().is_empty());
        assert!(rec.started_at().is_none());
        assert!(rec.is_idle());
        assert!(!rec.poll_publish(start + Duration::seconds(10)));
    }

    #[test]
    fn test_map_key() {
        use crossterm::event::{KeyEvent, KeyEventKind, KeyEventState};

        let plain = |code| KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        };
        assert_eq!(map_key(plain(KeyCode::Char('a'))), Some(Keystroke::Char('a')));
        assert_eq!(map_key(plain(KeyCode::Backspace)), Some(Keystroke::Backspace));
        assert_eq!(map_key(plain(KeyCode::Enter)), None);

        let ctrl_c = KeyEvent {
            code: KeyCode::Char('c'),
            modifiers: KeyModifiers::CONTROL,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        };
        assert_eq!(map_key(ctrl_c), None);
    }
}
