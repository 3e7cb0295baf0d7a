//! Reference game: tic-tac-toe.
//!
//! Nine cells, row-major, X moves first. Small enough that every pipeline
//! component can be exercised end to end with a dummy evaluator, complete
//! enough to have real zero-sum terminal values.

use super::{GameState, Outcome, PositionEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    fn other(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// A move is the target cell index, `0..9`, row-major.
pub type Cell = usize;

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicTacToe {
    cells: [Option<Mark>; 9],
    to_move: Mark,
}

impl TicTacToe {
    pub fn new() -> Self {
        Self {
            cells: [None; 9],
            to_move: Mark::X,
        }
    }

    pub fn to_move(&self) -> Mark {
        self.to_move
    }

    fn winner(&self) -> Option<Mark> {
        LINES.iter().find_map(|line| {
            let mark = self.cells[line[0]]?;
            line.iter()
                .all(|&i| self.cells[i] == Some(mark))
                .then_some(mark)
        })
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState for TicTacToe {
    type Move = Cell;

    fn legal_moves(&self) -> Vec<Cell> {
        if self.winner().is_some() {
            return Vec::new();
        }
        (0..9).filter(|&i| self.cells[i].is_none()).collect()
    }

    fn apply(&mut self, mv: Cell) {
        self.cells[mv] = Some(self.to_move);
        self.to_move = self.to_move.other();
    }

    fn outcome(&self) -> Option<Outcome> {
        if let Some(winner) = self.winner() {
            // The winning move flips `to_move`, so in regular play the side
            // to move at a decided position has lost.
            return Some(if winner == self.to_move {
                Outcome::Win
            } else {
                Outcome::Loss
            });
        }
        if self.cells.iter().all(|cell| cell.is_some()) {
            return Some(Outcome::Draw);
        }
        None
    }

    fn canonical_key(&self) -> String {
        let mut key = String::with_capacity(10);
        for cell in &self.cells {
            key.push(match cell {
                Some(Mark::X) => 'x',
                Some(Mark::O) => 'o',
                None => '.',
            });
        }
        key.push(match self.to_move {
            Mark::X => 'x',
            Mark::O => 'o',
        });
        key
    }
}

/// Encoder for [`TicTacToe`]: a nine-slot action space where the action
/// index *is* the cell, and two 9-cell feature planes (side to move first,
/// opponent second).
#[derive(Debug, Clone, Copy, Default)]
pub struct TicTacToeEncoder;

impl PositionEncoder<TicTacToe> for TicTacToeEncoder {
    fn action_space(&self) -> usize {
        9
    }

    fn encode(&self, state: &TicTacToe) -> Vec<f32> {
        let mut features = vec![0.0; 18];
        for (i, cell) in state.cells.iter().enumerate() {
            match cell {
                Some(mark) if *mark == state.to_move => features[i] = 1.0,
                Some(_) => features[9 + i] = 1.0,
                None => {}
            }
        }
        features
    }

    fn move_to_index(&self, mv: Cell) -> usize {
        mv
    }

    fn index_to_move(&self, index: usize) -> Option<Cell> {
        (index < 9).then_some(index)
    }

    fn decode_key(&self, key: &str) -> Option<TicTacToe> {
        let bytes = key.as_bytes();
        if bytes.len() != 10 {
            return None;
        }
        let mut cells = [None; 9];
        for (i, &b) in bytes[..9].iter().enumerate() {
            cells[i] = match b {
                b'x' => Some(Mark::X),
                b'o' => Some(Mark::O),
                b'.' => None,
                _ => return None,
            };
        }
        let to_move = match bytes[9] {
            b'x' => Mark::X,
            b'o' => Mark::O,
            _ => return None,
        };
        Some(TicTacToe { cells, to_move })
    }
}
