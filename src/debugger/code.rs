//! Engine facing traits: executable items, turns, dialog contexts and the code model
//! turning a paused step into stack frames.

use crate::debugger::variable::{Inspector, Value};
use crate::debugger::Error;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Execution unit of the engine (dialog, action, recognizer...).
///
/// The debugger never looks inside an item, it is an identity key for breakpoints
/// and source ranges plus a display name.
pub trait Item: Send + Sync + 'static {
    fn name(&self) -> String;
}

pub type ItemRef = Arc<dyn Item>;

/// Identity of an item, the address of its shared allocation.
pub fn item_key(item: &ItemRef) -> usize {
    Arc::as_ptr(item) as *const () as usize
}

/// One conversational turn, the unit shown to the client as a thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turn {
    pub channel_id: String,
    pub activity_id: String,
    pub text: String,
    pub activity_type: String,
}

impl Turn {
    pub fn new(channel_id: &str, activity_id: &str, text: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            activity_id: activity_id.to_string(),
            text: text.to_string(),
            activity_type: "message".to_string(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}-{}", self.channel_id, self.activity_id)
    }

    /// Trimmed text of the turn, activity type for turns without one.
    pub fn label(&self) -> &str {
        let text = self.text.trim();
        if text.is_empty() {
            self.activity_type.as_str()
        } else {
            text
        }
    }
}

/// Active dialog on a context stack.
#[derive(Clone)]
pub struct DialogInstance {
    pub id: String,
    pub dialog: Option<ItemRef>,
}

/// Execution state of one dialog nesting level within a turn.
pub trait DialogContext: Send + Sync {
    /// Id of the turn this context runs in, see [`Turn::id`].
    fn turn_id(&self) -> String;

    fn parent(&self) -> Option<Arc<dyn DialogContext>>;

    /// Active dialogs, innermost first.
    fn stack(&self) -> Vec<DialogInstance>;

    /// Memory visible from this context.
    fn state(&self) -> Value;

    fn evaluate(&self, expression: &str) -> Result<Value, Error> {
        Inspector::global().resolve(&self.state(), expression)
    }
}

/// A stack frame.
pub struct CodePoint {
    pub name: String,
    pub item: ItemRef,
    pub more: String,
    pub context: Arc<dyn DialogContext>,
}

impl CodePoint {
    pub fn data(&self) -> Value {
        self.context.state()
    }

    pub fn evaluate(&self, expression: &str) -> Result<Value, Error> {
        self.context.evaluate(expression)
    }
}

impl Debug for CodePoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodePoint")
            .field("name", &self.name)
            .field("more", &self.more)
            .finish()
    }
}

pub trait CodeModel: Send + Sync {
    fn name_for(&self, item: &ItemRef) -> String;

    /// Frames of a step on `item`, innermost first.
    fn points_for(
        &self,
        context: &Arc<dyn DialogContext>,
        item: &ItemRef,
        more: &str,
    ) -> Vec<CodePoint>;
}

/// Frames are the stepped item followed by every active dialog of the context chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCodeModel;

impl CodeModel for DefaultCodeModel {
    fn name_for(&self, item: &ItemRef) -> String {
        item.name()
    }

    fn points_for(
        &self,
        context: &Arc<dyn DialogContext>,
        item: &ItemRef,
        more: &str,
    ) -> Vec<CodePoint> {
        let mut points = vec![CodePoint {
            name: self.name_for(item),
            item: item.clone(),
            more: more.to_string(),
            context: context.clone(),
        }];

        let mut current = Some(context.clone());
        while let Some(ctx) = current {
            for instance in ctx.stack() {
                let Some(dialog) = instance.dialog else {
                    continue;
                };
                if item_key(&dialog) == item_key(item) && points.len() == 1 {
                    // stepped item is the innermost dialog itself
                    continue;
                }
                points.push(CodePoint {
                    name: self.name_for(&dialog),
                    item: dialog,
                    more: instance.id,
                    context: ctx.clone(),
                });
            }
            current = ctx.parent();
        }
        points
    }
}
