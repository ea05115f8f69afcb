//! Operation identities understood by [`crate::CpuExecutor`].

use composite_tensor::OpKey;

pub const ADD: OpKey = OpKey::new("aten::add");
pub const MUL: OpKey = OpKey::new("aten::mul");
pub const NEG: OpKey = OpKey::new("aten::neg");
pub const SUM: OpKey = OpKey::new("aten::sum");
pub const CLONE: OpKey = OpKey::new("aten::clone");
pub const DETACH: OpKey = OpKey::new("aten::detach");
pub const ZEROS_LIKE: OpKey = OpKey::new("aten::zeros_like");
/// Device move; the target comes from the `device` keyword or the second positional argument.
pub const TO: OpKey = OpKey::new("aten::to");
