// Workflow debugger: simulated runs, breakpoints, coverage and scenario tests

pub mod controller;
pub mod failure;
pub mod runner;
pub mod session;

pub use controller::{DebugCommand, DebugConfig, DebugController, DebugOptions};
pub use failure::{FailureInjector, NoFailures, ScriptedFailures, SeededFailureInjector};
pub use runner::{Assertion, AssertionResult, AssertionType, TestFailure, TestResult, TestRunner, TestScenario, TestSuiteResult};
pub use session::{
    Breakpoint, BreakpointType, ComponentKind, Coverage, DebugLog, DebugSession, DebugSessionExport, ExecutionStep,
    LogLevel, Performance, SessionStatus, StepStatus,
};
