//! Control-channel messages.
//!
//! Every message is a one-byte-tagged variant; work items and results
//! carry a second one-byte kind tag selecting the phase payload. These
//! tags are the wire protocol: a receiver seeing an unknown tag must
//! treat it as a fatal protocol error, never skip it.

use oneloop_cosmology::types::{
    CountertermItem, CountertermResult, FilterItem, FilterResult, GrowthItem, GrowthResult,
    LoopItem, LoopResult, MultipoleItem, MultipoleResult, OneLoopItem, OneLoopResult, XyItem,
    XyResult,
};
use oneloop_wire::{BufReader, BufWriter, Decode, DecodeError, Encode};

/// The seven task phases, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskKind {
    Filter = 1,
    Growth = 2,
    MatsubaraXy = 3,
    Loop = 4,
    OneLoop = 5,
    Multipole = 6,
    Counterterm = 7,
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            TaskKind::Filter => "linear-spectrum filter",
            TaskKind::Growth => "growth factors",
            TaskKind::MatsubaraXy => "Matsubara XY",
            TaskKind::Loop => "loop kernels",
            TaskKind::OneLoop => "one-loop P(k)",
            TaskKind::Multipole => "multipole P(k)",
            TaskKind::Counterterm => "counterterms",
        }
    }

    fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        Ok(match tag {
            1 => TaskKind::Filter,
            2 => TaskKind::Growth,
            3 => TaskKind::MatsubaraXy,
            4 => TaskKind::Loop,
            5 => TaskKind::OneLoop,
            6 => TaskKind::Multipole,
            7 => TaskKind::Counterterm,
            tag => return Err(DecodeError::InvalidTag { tag, kind: "task kind" }),
        })
    }
}

impl Encode for TaskKind {
    fn encode(&self, out: &mut impl BufWriter) {
        out.put_u8(*self as u8);
    }
}

impl Decode for TaskKind {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        TaskKind::from_tag(reader.get_u8()?)
    }
}

macro_rules! tagged_payload {
    ($(#[$attr:meta])* $name:ident { $($variant:ident($payload:ty) = $kind:ident,)+ }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $name {
            $($variant($payload),)+
        }

        impl $name {
            pub fn kind(&self) -> TaskKind {
                match self {
                    $($name::$variant(_) => TaskKind::$kind,)+
                }
            }
        }

        impl Encode for $name {
            fn encode(&self, out: &mut impl BufWriter) {
                self.kind().encode(out);
                match self {
                    $($name::$variant(payload) => payload.encode(out),)+
                }
            }
        }

        impl Decode for $name {
            fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
                Ok(match TaskKind::decode(reader)? {
                    $(TaskKind::$kind => $name::$variant(<$payload>::decode(reader)?),)+
                })
            }
        }
    };
}

tagged_payload!(
    /// An outgoing unit of work, one variant per phase.
    WorkItem {
        Filter(FilterItem) = Filter,
        Growth(GrowthItem) = Growth,
        MatsubaraXy(XyItem) = MatsubaraXy,
        Loop(LoopItem) = Loop,
        OneLoop(OneLoopItem) = OneLoop,
        Multipole(MultipoleItem) = Multipole,
        Counterterm(CountertermItem) = Counterterm,
    }
);

tagged_payload!(
    /// A completed unit of work, one variant per phase.
    WorkResult {
        Filter(FilterResult) = Filter,
        Growth(GrowthResult) = Growth,
        MatsubaraXy(XyResult) = MatsubaraXy,
        Loop(LoopResult) = Loop,
        OneLoop(OneLoopResult) = OneLoop,
        Multipole(MultipoleResult) = Multipole,
        Counterterm(CountertermResult) = Counterterm,
    }
);

const TAG_TASK_BEGIN: u8 = 1;
const TAG_READY_FOR_WORK: u8 = 2;
const TAG_NEW_ITEM: u8 = 3;
const TAG_RESULT: u8 = 4;
const TAG_TASK_END: u8 = 5;
const TAG_TERMINATE: u8 = 6;

/// A control-channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Master -> worker: enter the given phase.
    TaskBegin(TaskKind),
    /// Worker -> master: idle and willing to accept an item.
    ReadyForWork,
    /// Master -> worker: process this payload.
    NewItem(Box<WorkItem>),
    /// Worker -> master: completed payload.
    Result(Box<WorkResult>),
    /// Master -> worker: leave the phase, return to idle.
    TaskEnd,
    /// Master -> worker: exit the worker loop.
    Terminate,
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::TaskBegin(_) => "TASK_BEGIN",
            Message::ReadyForWork => "READY_FOR_WORK",
            Message::NewItem(_) => "NEW_ITEM",
            Message::Result(_) => "RESULT",
            Message::TaskEnd => "TASK_END",
            Message::Terminate => "TERMINATE",
        }
    }
}

impl Encode for Message {
    fn encode(&self, out: &mut impl BufWriter) {
        match self {
            Message::TaskBegin(kind) => {
                out.put_u8(TAG_TASK_BEGIN);
                kind.encode(out);
            }
            Message::ReadyForWork => out.put_u8(TAG_READY_FOR_WORK),
            Message::NewItem(item) => {
                out.put_u8(TAG_NEW_ITEM);
                item.encode(out);
            }
            Message::Result(result) => {
                out.put_u8(TAG_RESULT);
                result.encode(out);
            }
            Message::TaskEnd => out.put_u8(TAG_TASK_END),
            Message::Terminate => out.put_u8(TAG_TERMINATE),
        }
    }
}

impl Decode for Message {
    fn decode<'de>(reader: &mut impl BufReader<'de>) -> Result<Self, DecodeError> {
        Ok(match reader.get_u8()? {
            TAG_TASK_BEGIN => Message::TaskBegin(TaskKind::decode(reader)?),
            TAG_READY_FOR_WORK => Message::ReadyForWork,
            TAG_NEW_ITEM => Message::NewItem(Box::new(WorkItem::decode(reader)?)),
            TAG_RESULT => Message::Result(Box::new(WorkResult::decode(reader)?)),
            TAG_TASK_END => Message::TaskEnd,
            TAG_TERMINATE => Message::Terminate,
            tag => return Err(DecodeError::InvalidTag { tag, kind: "message" }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oneloop_cosmology::frw::mdr1;
    use oneloop_cosmology::GrowthParams;
    use oneloop_units::{GrowthParamsToken, ModelToken, ZToken};

    fn growth_item() -> WorkItem {
        WorkItem::Growth(GrowthItem {
            model: mdr1(),
            model_tok: ModelToken::new(0),
            params_tok: GrowthParamsToken::new(1),
            params: GrowthParams::default(),
            zs: vec![(ZToken::new(0), 0.0), (ZToken::new(1), 0.25)],
        })
    }

    #[test]
    fn control_messages_roundtrip() {
        for message in [
            Message::TaskBegin(TaskKind::Loop),
            Message::ReadyForWork,
            Message::NewItem(Box::new(growth_item())),
            Message::TaskEnd,
            Message::Terminate,
        ] {
            let bytes = message.encoded();
            assert_eq!(Message::from_slice(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn unknown_message_tag_is_fatal() {
        let err = Message::from_slice(&[0x2a]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTag { tag: 0x2a, .. }));
    }

    #[test]
    fn unknown_kind_tag_is_fatal() {
        // NEW_ITEM with an out-of-range kind byte.
        let err = Message::from_slice(&[TAG_NEW_ITEM, 0x10]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTag { tag: 0x10, .. }));
    }

    #[test]
    fn item_kind_matches_variant() {
        assert_eq!(growth_item().kind(), TaskKind::Growth);
    }
}
