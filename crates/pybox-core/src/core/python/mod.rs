pub mod python_sys;

pub use python_sys::{detect_interpreter, find_optional_tools, probe_interpreter, InterpreterInfo};
