use crate::graph::{predefined, NodeId};

/// The read-only variables resolved from the live evaluation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemVar {
    CurrentFrom,
    CurrentTo,
    CurrentMeaning,
    CurrentSin,
    CurrentInfo,
    ReturnValue,
}

impl SystemVar {
    pub const ALL: [SystemVar; 6] = [
        SystemVar::CurrentFrom,
        SystemVar::CurrentTo,
        SystemVar::CurrentMeaning,
        SystemVar::CurrentSin,
        SystemVar::CurrentInfo,
        SystemVar::ReturnValue,
    ];

    pub fn from_id(id: NodeId) -> Option<Self> {
        Self::ALL.into_iter().find(|var| var.id() == id)
    }

    pub fn id(self) -> NodeId {
        match self {
            SystemVar::CurrentFrom => predefined::CURRENT_FROM,
            SystemVar::CurrentTo => predefined::CURRENT_TO,
            SystemVar::CurrentMeaning => predefined::CURRENT_MEANING,
            SystemVar::CurrentSin => predefined::CURRENT_SIN,
            SystemVar::CurrentInfo => predefined::CURRENT_INFO,
            SystemVar::ReturnValue => predefined::RETURN_VALUE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemVar::CurrentFrom => "CurrentFrom",
            SystemVar::CurrentTo => "CurrentTo",
            SystemVar::CurrentMeaning => "CurrentMeaning",
            SystemVar::CurrentSin => "CurrentSin",
            SystemVar::CurrentInfo => "CurrentInfo",
            SystemVar::ReturnValue => "ReturnValue",
        }
    }
}
