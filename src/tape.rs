//! Two-stack tape for reverse-mode AD.
//!
//! Elementary operations store their precomputed partial derivatives and
//! operand indices during the forward pass, so the reverse sweep is a plain
//! multiply-accumulate loop. Operations with a hand-written gradient (see
//! [`crate::op`]) are recorded as *custom statements*: a pullback closure plus
//! the indices it reads from and the contiguous block of outputs it produced.

use std::cell::Cell;
use std::fmt;

use crate::Float;

/// Sentinel index indicating a constant (not recorded on tape).
pub const CONSTANT: u32 = u32::MAX;

/// Marks a statement that is not a custom statement.
const NOT_CUSTOM: u32 = u32::MAX;

/// Maps the adjoints of a custom statement's outputs to the adjoints of its
/// inputs.
pub type Pullback<F> = Box<dyn Fn(&[F]) -> Vec<F>>;

/// A recorded operation. Elementary statements own the operand multipliers in
/// `[prev.end_plus_one .. self.end_plus_one)`; custom statements own an entry
/// in `Tape::customs` and no multipliers.
#[derive(Clone, Copy, Debug)]
struct Statement {
    lhs_index: u32,
    end_plus_one: u32,
    custom: u32,
}

struct CustomStatement<F> {
    inputs: Vec<u32>,
    first_output: u32,
    num_outputs: u32,
    pullback: Pullback<F>,
}

/// Reverse-mode tape.
///
/// Independent variables are leaves with no statement; every other value
/// gets one fresh index per result.
pub struct Tape<F: Float> {
    statements: Vec<Statement>,
    multipliers: Vec<F>,
    indices: Vec<u32>,
    customs: Vec<CustomStatement<F>>,
    num_variables: u32,
}

impl<F: Float> Default for Tape<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> fmt::Debug for Tape<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tape")
            .field("num_variables", &self.num_variables)
            .field("num_statements", &(self.statements.len() - 1))
            .field("num_custom", &self.customs.len())
            .finish()
    }
}

impl<F: Float> Tape<F> {
    /// Create an empty tape.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a tape with room for roughly `est_ops` elementary operations.
    pub fn with_capacity(est_ops: usize) -> Self {
        let mut statements = Vec::with_capacity(est_ops + 1);
        // Sentinel so `statements[i - 1].end_plus_one` is valid for i >= 1.
        statements.push(Statement {
            lhs_index: 0,
            end_plus_one: 0,
            custom: NOT_CUSTOM,
        });
        Tape {
            statements,
            multipliers: Vec::with_capacity(est_ops * 2),
            indices: Vec::with_capacity(est_ops * 2),
            customs: Vec::new(),
            num_variables: 0,
        }
    }

    /// Number of indices allocated so far (leaves and results).
    #[inline]
    pub fn num_variables(&self) -> usize {
        self.num_variables as usize
    }

    /// Number of custom statements recorded.
    #[inline]
    pub fn num_custom(&self) -> usize {
        self.customs.len()
    }

    /// Register a new independent variable. Returns `(index, value)`.
    #[inline]
    pub fn new_variable(&mut self, value: F) -> (u32, F) {
        let idx = self.num_variables;
        self.num_variables += 1;
        (idx, value)
    }

    #[inline]
    fn push_statement(&mut self, lhs_index: u32, custom: u32) {
        self.statements.push(Statement {
            lhs_index,
            end_plus_one: self.multipliers.len() as u32,
            custom,
        });
    }

    /// Record `result = f(operand)` with `multiplier = df/d(operand)`.
    #[inline]
    pub fn push_unary(&mut self, operand_idx: u32, multiplier: F) -> u32 {
        let result_idx = self.num_variables;
        self.num_variables += 1;

        if operand_idx != CONSTANT {
            self.multipliers.push(multiplier);
            self.indices.push(operand_idx);
        }
        self.push_statement(result_idx, NOT_CUSTOM);
        result_idx
    }

    /// Record a binary operation with precomputed partial derivatives.
    #[inline]
    pub fn push_binary(&mut self, lhs_idx: u32, lhs_mult: F, rhs_idx: u32, rhs_mult: F) -> u32 {
        let result_idx = self.num_variables;
        self.num_variables += 1;

        if lhs_idx != CONSTANT {
            self.multipliers.push(lhs_mult);
            self.indices.push(lhs_idx);
        }
        if rhs_idx != CONSTANT {
            self.multipliers.push(rhs_mult);
            self.indices.push(rhs_idx);
        }
        self.push_statement(result_idx, NOT_CUSTOM);
        result_idx
    }

    /// Record an operation with a hand-written gradient.
    ///
    /// Allocates `num_outputs` consecutive indices and returns the first one.
    /// During the reverse sweep `pullback` receives the adjoints of those
    /// outputs and must return one adjoint per entry of `inputs`.
    pub fn push_custom(&mut self, inputs: Vec<u32>, num_outputs: usize, pullback: Pullback<F>) -> u32 {
        let first_output = self.num_variables;
        self.num_variables += num_outputs as u32;

        let custom = self.customs.len() as u32;
        assert!(custom != NOT_CUSTOM, "too many custom statements");
        self.customs.push(CustomStatement {
            inputs,
            first_output,
            num_outputs: num_outputs as u32,
            pullback,
        });
        self.push_statement(first_output, custom);
        first_output
    }

    /// Run the reverse sweep, seeding the adjoint of `seed_index` with 1.
    /// Returns the full adjoint vector.
    pub fn reverse(&self, seed_index: u32) -> Vec<F> {
        let mut adjoints = vec![F::zero(); self.num_variables as usize];
        if seed_index != CONSTANT {
            adjoints[seed_index as usize] = F::one();
        }
        self.sweep(&mut adjoints);
        adjoints
    }

    /// Run the reverse sweep with custom adjoint seeds. Seeds on the same
    /// index accumulate; seeds on [`CONSTANT`] are ignored.
    pub fn reverse_seeded(&self, seeds: &[(u32, F)]) -> Vec<F> {
        let mut adjoints = vec![F::zero(); self.num_variables as usize];
        for &(idx, seed) in seeds {
            if idx != CONSTANT {
                adjoints[idx as usize] = adjoints[idx as usize] + seed;
            }
        }
        self.sweep(&mut adjoints);
        adjoints
    }

    fn sweep(&self, adjoints: &mut [F]) {
        for i in (1..self.statements.len()).rev() {
            let stmt = self.statements[i];
            if stmt.custom != NOT_CUSTOM {
                self.sweep_custom(&self.customs[stmt.custom as usize], adjoints);
                continue;
            }

            let a = adjoints[stmt.lhs_index as usize];
            if a != F::zero() {
                adjoints[stmt.lhs_index as usize] = F::zero();
                let start = self.statements[i - 1].end_plus_one as usize;
                let end = stmt.end_plus_one as usize;
                for j in start..end {
                    let idx = self.indices[j] as usize;
                    adjoints[idx] = adjoints[idx] + self.multipliers[j] * a;
                }
            }
        }
    }

    fn sweep_custom(&self, custom: &CustomStatement<F>, adjoints: &mut [F]) {
        let start = custom.first_output as usize;
        let end = start + custom.num_outputs as usize;
        let upstream = &mut adjoints[start..end];
        if upstream.iter().all(|&a| a == F::zero()) {
            return;
        }
        let seed = upstream.to_vec();
        upstream.fill(F::zero());

        let input_adjoints = (custom.pullback)(&seed);
        assert_eq!(
            input_adjoints.len(),
            custom.inputs.len(),
            "pullback returned {} adjoints for {} inputs",
            input_adjoints.len(),
            custom.inputs.len()
        );
        for (&idx, g) in custom.inputs.iter().zip(input_adjoints) {
            if idx != CONSTANT {
                adjoints[idx as usize] = adjoints[idx as usize] + g;
            }
        }
    }
}

// Thread-local active tape pointer.
thread_local! {
    static TAPE_F32: Cell<*mut Tape<f32>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_F64: Cell<*mut Tape<f64>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Selects the thread-local tape slot for a float type.
pub trait TapeThreadLocal: Float {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>>;
}

impl TapeThreadLocal for f32 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F32
    }
}

impl TapeThreadLocal for f64 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F64
    }
}

/// Access the active tape for the current thread. Panics if no tape is active.
#[inline]
pub fn with_active_tape<F: TapeThreadLocal, R>(f: impl FnOnce(&mut Tape<F>) -> R) -> R {
    F::cell().with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "No active tape. Use nux::grad() or nux::vjp() to record."
        );
        // SAFETY: TapeGuard keeps the pointer valid for the lifetime of the
        // recording scope, and the thread-local gives exclusive access.
        let tape = unsafe { &mut *ptr };
        f(tape)
    })
}

/// RAII guard that makes a tape the thread-local active tape and restores the
/// previous one on drop. Guards nest, so a pullback may record and sweep its
/// own local tape while an outer tape is being swept.
pub struct TapeGuard<F: TapeThreadLocal> {
    prev: *mut Tape<F>,
}

impl<F: TapeThreadLocal> TapeGuard<F> {
    /// Activate `tape`; the previous active tape comes back when the guard drops.
    pub fn new(tape: &mut Tape<F>) -> Self {
        let prev = F::cell().with(|cell| {
            let prev = cell.get();
            cell.set(tape as *mut Tape<F>);
            prev
        });
        TapeGuard { prev }
    }
}

impl<F: TapeThreadLocal> Drop for TapeGuard<F> {
    fn drop(&mut self) {
        F::cell().with(|cell| {
            cell.set(self.prev);
        });
    }
}
