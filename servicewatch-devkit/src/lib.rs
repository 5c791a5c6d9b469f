/*!
# ServiceWatch DevKit

Test support for the ServiceWatch processor:
- JSON builders for equipment snapshots and operator commands
- A harness running invocations against in-memory channels
*/

pub mod fixtures;
pub mod test_utils;

pub use fixtures::{previous_ui_state, CommandsBuilder, EquipmentBuilder};
pub use test_utils::{TestHarness, TestStats, TEST_AGENT_ID};
