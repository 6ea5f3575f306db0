//! Built-in tools for rill.
//!
//! These tools are always available and are also visible as values in the
//! builtin namespace (`$put`, `$builtin:echo`).

mod arith;
mod each;
mod feedchan;
mod grep;
mod print;
mod put;
mod sed;
mod true_false;
mod type_of;

use super::ToolRegistry;

/// Register all built-in tools with the registry.
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(arith::Arith::Add);
    registry.register(arith::Arith::Sub);
    registry.register(arith::Arith::Mul);
    registry.register(arith::Arith::Div);
    registry.register(each::Each);
    registry.register(feedchan::Feedchan);
    registry.register(grep::Grep);
    registry.register(print::Print::PRINT);
    registry.register(print::Print::PRINTLN);
    registry.register(print::Print::ECHO);
    registry.register(put::Put);
    registry.register(sed::Sed);
    registry.register(true_false::True);
    registry.register(true_false::False);
    registry.register(type_of::TypeOf);
}
