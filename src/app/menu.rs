//! Radial menu disambiguation.
//!
//! The menu holds the top decoder guess in its center and the next
//! candidates on a ring of 4, 6 or 8 slots. Directions from the selection
//! gesture pick a ring slot; a click picks the center.

use heapless::Vec as HeaplessVec;
use serde::{Deserialize, Serialize};

use crate::app::types::{CandidateList, Direction};

/// Largest number of candidates any arity shows (center + 8 ring slots).
pub const MAX_MENU_CANDIDATES: usize = 9;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MenuError {
    #[error("cannot open a menu without candidates")]
    EmptyCandidates,
    #[error("menu is closed")]
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuArity {
    Four,
    Six,
    Nine,
}

impl MenuArity {
    pub fn ring_slots(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Six => 6,
            Self::Nine => 8,
        }
    }

    /// Candidates the menu consumes: the center plus one per ring slot.
    pub fn capacity(self) -> usize {
        self.ring_slots() + 1
    }

    /// Ring slot for an angle in degrees.
    ///
    /// The four and six slot layouts number their upper half right to left,
    /// which keeps the two slots either side of the vertical axis mirrored.
    /// The nine slot layout is offset by half a sector so compass points sit
    /// in the middle of their slot.
    pub fn ring_slot(self, angle_deg: i32) -> usize {
        let angle = angle_deg.rem_euclid(360);
        match self {
            Self::Four => mirror_upper(angle as usize / 90, 2),
            Self::Six => mirror_upper(angle as usize / 60, 3),
            Self::Nine => (((angle as f64 + 22.5) % 360.0) / 45.0) as usize,
        }
    }
}

fn mirror_upper(sector: usize, upper: usize) -> usize {
    if sector < upper {
        upper - 1 - sector
    } else {
        sector
    }
}

#[derive(Debug, Default)]
enum MenuState {
    #[default]
    Closed,
    Open {
        arity: MenuArity,
        candidates: HeaplessVec<String, MAX_MENU_CANDIDATES>,
        /// `None` is the center slot.
        highlighted: Option<usize>,
    },
}

#[derive(Debug, Default)]
pub struct RadialMenu {
    state: MenuState,
}

impl RadialMenu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, MenuState::Open { .. })
    }

    pub fn arity(&self) -> Option<MenuArity> {
        match &self.state {
            MenuState::Open { arity, .. } => Some(*arity),
            MenuState::Closed => None,
        }
    }

    /// Currently highlighted ring slot; `None` when the center is highlighted
    /// or the menu is closed.
    pub fn highlighted(&self) -> Option<usize> {
        match &self.state {
            MenuState::Open { highlighted, .. } => *highlighted,
            MenuState::Closed => None,
        }
    }

    /// Shows `list`, keeping at most `arity.capacity()` candidates. Reopening
    /// replaces whatever the menu held before.
    pub fn open(&mut self, arity: MenuArity, list: &CandidateList) -> Result<(), MenuError> {
        if list.is_empty() {
            return Err(MenuError::EmptyCandidates);
        }
        let mut candidates = HeaplessVec::new();
        for word in list.words().take(arity.capacity()) {
            if candidates.push(word.to_string()).is_err() {
                break;
            }
        }
        log::info!(
            "menu: open arity={} candidates={}",
            arity.ring_slots(),
            candidates.len()
        );
        self.state = MenuState::Open {
            arity,
            candidates,
            highlighted: None,
        };
        Ok(())
    }

    /// Moves the highlight to the slot `direction` points at and returns it.
    /// `NoTrace` keeps the current highlight.
    pub fn highlight(&mut self, direction: Direction) -> Option<usize> {
        let MenuState::Open {
            arity, highlighted, ..
        } = &mut self.state
        else {
            return None;
        };
        let next = match direction {
            Direction::NoTrace => return *highlighted,
            Direction::Click => None,
            Direction::Toward { angle_deg, .. } => Some(arity.ring_slot(angle_deg)),
        };
        if *highlighted != next {
            log::debug!("menu: highlight slot={next:?}");
            *highlighted = next;
        }
        next
    }

    /// Word the current highlight resolves to.
    pub fn highlighted_word(&self) -> Option<&str> {
        match &self.state {
            MenuState::Open {
                candidates,
                highlighted,
                ..
            } => resolve(candidates, *highlighted),
            MenuState::Closed => None,
        }
    }

    /// Highlights `direction` and resolves it, closing the menu.
    ///
    /// `NoTrace` never confirms and leaves the menu open (`Ok(None)`). A ring
    /// slot without a candidate falls back to the center word.
    pub fn confirm(&mut self, direction: Direction) -> Result<Option<String>, MenuError> {
        if !self.is_open() {
            return Err(MenuError::Closed);
        }
        if direction == Direction::NoTrace {
            return Ok(None);
        }
        self.highlight(direction);
        let word = self.highlighted_word().map(str::to_string);
        log::info!("menu: confirm word={word:?}");
        self.state = MenuState::Closed;
        Ok(word)
    }

    /// Closes the menu and hands back the candidates it was showing.
    pub fn cancel(&mut self) -> Vec<String> {
        match std::mem::take(&mut self.state) {
            MenuState::Open { candidates, .. } => {
                log::info!("menu: cancel candidates={}", candidates.len());
                candidates.into_iter().collect()
            }
            MenuState::Closed => Vec::new(),
        }
    }

    /// Word shown in every slot, center first. Empty ring slots are `None`.
    pub fn slot_labels(&self) -> Vec<Option<&str>> {
        match &self.state {
            MenuState::Open {
                arity, candidates, ..
            } => (0..arity.capacity())
                .map(|i| candidates.get(i).map(String::as_str))
                .collect(),
            MenuState::Closed => Vec::new(),
        }
    }
}

fn resolve(candidates: &[String], highlighted: Option<usize>) -> Option<&str> {
    let index = match highlighted {
        Some(slot) if slot + 1 < candidates.len() => slot + 1,
        Some(slot) => {
            log::warn!("menu: empty_slot slot={slot} fallback=center");
            0
        }
        None => 0,
    };
    candidates.get(index).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toward(angle_deg: i32) -> Direction {
        Direction::Toward {
            angle_deg,
            distance: 0,
        }
    }

    fn open(arity: MenuArity, words: &[&str]) -> RadialMenu {
        let mut menu = RadialMenu::new();
        menu.open(arity, &CandidateList::from_words(words.iter().copied()))
            .expect("open");
        menu
    }

    #[test]
    fn four_slot_mapping_swaps_upper_sectors() {
        let slots: Vec<usize> = [0, 45, 89, 90, 179, 180, 269, 270, 359]
            .into_iter()
            .map(|a| MenuArity::Four.ring_slot(a))
            .collect();
        assert_eq!(slots, vec![1, 1, 1, 0, 0, 2, 2, 3, 3]);
        assert_eq!(MenuArity::Four.ring_slot(0), MenuArity::Four.ring_slot(360));
    }

    #[test]
    fn six_slot_mapping_mirrors_first_three_sectors() {
        let slots: Vec<usize> = [10, 70, 130, 190, 250, 310]
            .into_iter()
            .map(|a| MenuArity::Six.ring_slot(a))
            .collect();
        assert_eq!(slots, vec![2, 1, 0, 3, 4, 5]);
    }

    #[test]
    fn nine_slot_mapping_centers_compass_points() {
        assert_eq!(MenuArity::Nine.ring_slot(0), 0);
        assert_eq!(MenuArity::Nine.ring_slot(22), 0);
        assert_eq!(MenuArity::Nine.ring_slot(23), 1);
        assert_eq!(MenuArity::Nine.ring_slot(90), 2);
        assert_eq!(MenuArity::Nine.ring_slot(338), 0);
        assert_eq!(MenuArity::Nine.ring_slot(337), 7);
    }

    #[test]
    fn click_confirms_top_candidate_for_every_arity() {
        for arity in [MenuArity::Four, MenuArity::Six, MenuArity::Nine] {
            let mut menu = open(arity, &["the", "then", "they"]);
            menu.highlight(toward(200));
            assert_eq!(menu.confirm(Direction::Click), Ok(Some("the".to_string())));
            assert!(!menu.is_open());
        }
    }

    #[test]
    fn ring_slot_confirms_following_candidate() {
        let mut menu = open(MenuArity::Four, &["a", "b", "c", "d", "e"]);
        assert_eq!(menu.confirm(toward(90)), Ok(Some("b".to_string())));

        let mut menu = open(MenuArity::Four, &["a", "b", "c", "d", "e"]);
        assert_eq!(menu.confirm(toward(300)), Ok(Some("e".to_string())));
    }

    #[test]
    fn no_trace_keeps_highlight_and_never_confirms() {
        let mut menu = open(MenuArity::Six, &["a", "b", "c", "d"]);
        assert_eq!(menu.highlight(toward(130)), Some(0));
        assert_eq!(menu.highlight(Direction::NoTrace), Some(0));
        assert_eq!(menu.confirm(Direction::NoTrace), Ok(None));
        assert!(menu.is_open());
        assert_eq!(menu.highlighted_word(), Some("b"));
    }

    #[test]
    fn repeated_highlight_is_idempotent() {
        let mut menu = open(MenuArity::Nine, &["a", "b", "c"]);
        for _ in 0..3 {
            assert_eq!(menu.highlight(toward(5)), Some(0));
        }
        assert_eq!(menu.highlighted(), Some(0));
    }

    #[test]
    fn missing_slot_candidate_clamps_to_center() {
        let mut menu = open(MenuArity::Four, &["only", "two"]);
        assert_eq!(menu.confirm(toward(270)), Ok(Some("only".to_string())));
    }

    #[test]
    fn empty_list_is_rejected_and_closed_menu_errors() {
        let mut menu = RadialMenu::new();
        assert_eq!(
            menu.open(MenuArity::Four, &CandidateList::default()),
            Err(MenuError::EmptyCandidates)
        );
        assert_eq!(menu.confirm(Direction::Click), Err(MenuError::Closed));
        assert_eq!(menu.highlight(toward(90)), None);
    }

    #[test]
    fn open_truncates_to_capacity_and_cancel_returns_candidates() {
        let words: Vec<String> = (0..12).map(|i| format!("w{i}")).collect();
        let mut menu = RadialMenu::new();
        menu.open(MenuArity::Four, &CandidateList::from_words(words))
            .expect("open");
        assert_eq!(menu.slot_labels().len(), 5);
        assert_eq!(menu.slot_labels()[4], Some("w4"));

        let shown = menu.cancel();
        assert_eq!(shown, vec!["w0", "w1", "w2", "w3", "w4"]);
        assert!(!menu.is_open());
        assert!(menu.cancel().is_empty());
    }
}
