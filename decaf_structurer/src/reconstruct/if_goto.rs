//! Collapse of `if COND goto L1; goto L2; L1:` into a single inverted conditional.
//!
//! Compilers emit the pair when the conditional opcode family cannot express the branch they
//! need (`if (!(..))` shapes, loop exits). The collapse must run before comparison aggregation
//! and loop recognition, both of which expect one branch per condition.

use crate::node::Node;

pub(crate) fn apply(list: &mut Vec<Node>) {
    let mut index = 0;
    while index + 2 < list.len() {
        let conditional = &list[index];
        if !conditional.is_conditional_branch() || !list[index + 1].is_goto() {
            index += 1;
            continue;
        }
        // The conditional must jump exactly over the goto.
        let Some(target) = conditional.jump_target() else {
            index += 1;
            continue;
        };
        if target != list[index + 2].offset || target <= conditional.offset {
            index += 1;
            continue;
        }
        let Some(goto_target) = list[index + 1].jump_target() else {
            index += 1;
            continue;
        };
        list[index].invert_condition();
        list[index].set_jump_target(goto_target);
        list.remove(index + 1);
        index += 1;
    }
}
