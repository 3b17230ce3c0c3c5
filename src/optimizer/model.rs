use std::collections::HashMap;

use good_lp::{Constraint, Expression, ProblemVariables, Variable, VariableDefinition};

/// Solver-independent description of a linear / mixed-integer program.
///
/// Schedulers build one of these and hand it to an [`LpSolver`](super::LpSolver);
/// the model is always minimised.
pub struct LinearModel {
    name: String,
    variables: ProblemVariables,
    tracked: Vec<Variable>,
    objective: Expression,
    constraints: Vec<Constraint>,
}

impl LinearModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: ProblemVariables::new(),
            tracked: Vec::new(),
            objective: Expression::from(0.0),
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, definition: VariableDefinition) -> Variable {
        let variable = self.variables.add(definition);
        self.tracked.push(variable);
        variable
    }

    pub fn add_vector(&mut self, definition: VariableDefinition, len: usize) -> Vec<Variable> {
        (0..len).map(|_| self.add(definition.clone())).collect()
    }

    /// Add a term to the objective.
    pub fn add_cost(&mut self, term: Expression) {
        self.objective += term;
    }

    pub fn constrain(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn variable_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Split into the parts a backend needs.
    pub fn into_parts(self) -> ModelParts {
        ModelParts {
            name: self.name,
            variables: self.variables,
            tracked: self.tracked,
            objective: self.objective,
            constraints: self.constraints,
        }
    }
}

impl std::fmt::Debug for LinearModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearModel")
            .field("name", &self.name)
            .field("variables", &self.tracked.len())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

/// Owned pieces of a [`LinearModel`], consumed by a solver backend.
pub struct ModelParts {
    pub name: String,
    pub variables: ProblemVariables,
    pub tracked: Vec<Variable>,
    pub objective: Expression,
    pub constraints: Vec<Constraint>,
}

/// Primal values of an optimal solution.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    values: HashMap<Variable, f64>,
    objective: f64,
}

impl Assignment {
    pub fn new(values: HashMap<Variable, f64>, objective: f64) -> Self {
        Self { values, objective }
    }

    /// Value of `variable`; variables the backend did not report read as zero.
    pub fn value(&self, variable: Variable) -> f64 {
        self.values.get(&variable).copied().unwrap_or(0.0)
    }

    pub fn values(&self, variables: &[Variable]) -> Vec<f64> {
        variables.iter().map(|v| self.value(*v)).collect()
    }

    /// Binary variables come back as floats within solver tolerance.
    pub fn is_set(&self, variable: Variable) -> bool {
        self.value(variable) > 0.5
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }
}
