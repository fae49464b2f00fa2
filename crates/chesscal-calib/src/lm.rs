//! Dense non-linear least squares on top of the `levenberg-marquardt` crate.
//!
//! Problems expose residuals and, optionally, an analytic or structured
//! Jacobian. The default Jacobian is a central finite difference over all
//! parameters.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use lm_nalgebra::{storage::Owned, Dyn};
use log::trace;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Non-linear least squares problem: minimise `0.5 * |r(x)|^2`.
pub trait NllsProblem {
    fn num_params(&self) -> usize;

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let r0 = self.residuals(x);
        let mut jac = DMatrix::zeros(r0.len(), self.num_params());
        let mut xp = x.clone();
        for c in 0..self.num_params() {
            let h = fd_step(x[c]);
            xp[c] = x[c] + h;
            let rp = self.residuals(&xp);
            xp[c] = x[c] - h;
            let rm = self.residuals(&xp);
            xp[c] = x[c];
            jac.column_mut(c).copy_from(&((rp - rm) / (2.0 * h)));
        }
        jac
    }
}

/// Central difference step scaled to the parameter magnitude.
#[inline]
pub(crate) fn fd_step(x: f64) -> f64 {
    1e-6 * x.abs().max(1.0)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Evaluation budget, in units of `num_params + 1` residual evaluations.
    pub max_iters: usize,
    /// Relative cost decrease below which the solve stops.
    pub ftol: f64,
    /// Cosine between residuals and Jacobian columns below which the solve stops.
    pub gtol: f64,
    /// Relative step size below which the solve stops.
    pub xtol: f64,
    /// Initial trust region radius, relative to the scaled parameter norm.
    pub stepbound: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            gtol: 1e-10,
            xtol: 1e-12,
            stepbound: 100.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
    pub termination: String,
}

/// Bridges a [`NllsProblem`] to the solver crate, whose nalgebra major may
/// differ from ours; vectors cross over as column-major slices.
struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &lm_nalgebra::DVector<f64>) {
        self.params = DVector::from_column_slice(x.as_slice());
    }

    fn params(&self) -> lm_nalgebra::DVector<f64> {
        lm_nalgebra::DVector::from_column_slice(self.params.as_slice())
    }

    fn residuals(&self) -> Option<lm_nalgebra::DVector<f64>> {
        let r = self.problem.residuals(&self.params);
        Some(lm_nalgebra::DVector::from_column_slice(r.as_slice()))
    }

    fn jacobian(&self) -> Option<lm_nalgebra::DMatrix<f64>> {
        let j = self.problem.jacobian(&self.params);
        Some(lm_nalgebra::DMatrix::from_column_slice(
            j.nrows(),
            j.ncols(),
            j.as_slice(),
        ))
    }
}

/// Minimise `problem` starting from `x0`.
///
/// A start with non-finite residuals is returned untouched and unconverged.
/// Stopping because no further decrease is representable counts as
/// converged: the cost already sits at a minimum to machine precision.
pub fn levenberg_marquardt<P: NllsProblem>(
    problem: &P,
    x0: DVector<f64>,
    opts: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let initial_cost = 0.5 * problem.residuals(&x0).norm_squared();
    if !initial_cost.is_finite() {
        return (
            x0,
            SolveReport {
                iterations: 0,
                initial_cost,
                final_cost: initial_cost,
                converged: false,
                termination: "non-finite initial residuals".to_string(),
            },
        );
    }

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_stepbound(opts.stepbound)
        .with_patience(opts.max_iters.max(1));
    let (wrapper, report) = lm.minimize(LmWrapper {
        problem,
        params: x0,
    });

    let converged = report.termination.was_successful()
        || matches!(report.termination, TerminationReason::NoImprovementPossible(_));
    trace!(
        "lm: {:?} after {} evaluations, cost {initial_cost:.6e} -> {:.6e}",
        report.termination,
        report.number_of_evaluations,
        report.objective_function
    );

    (
        wrapper.params,
        SolveReport {
            iterations: report.number_of_evaluations,
            initial_cost,
            final_cost: report.objective_function,
            converged,
            termination: format!("{:?}", report.termination),
        },
    )
}
