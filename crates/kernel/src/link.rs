//! Deferred references and the remap table used by the link pass.

use crate::handle::{Handle, WeakHandle};
use crate::manager::ObjectManager;
use ember_common::{ByteReader, ByteWriter, CoreError, InstanceId};
use std::collections::BTreeMap;
use std::fmt;

/// Anything that refers to a managed object by instance id.
pub trait LinkTarget {
    fn target_id(&self) -> InstanceId;
}

impl LinkTarget for Handle {
    fn target_id(&self) -> InstanceId {
        self.instance_id()
    }
}

impl LinkTarget for WeakHandle {
    fn target_id(&self) -> InstanceId {
        self.instance_id()
    }
}

/// A reference field that is either still an old instance id read from a
/// stream, or a live reference produced by the link pass.
#[derive(Debug, Clone)]
pub enum ObjectLink<H> {
    Unresolved(InstanceId),
    Resolved(H),
}

impl<H: LinkTarget> ObjectLink<H> {
    pub fn resolved(&self) -> Option<&H> {
        match self {
            Self::Resolved(target) => Some(target),
            Self::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Current instance id of the referenced object, for writing.
    ///
    /// Fails on an unresolved link: the stored id belongs to a stream, not to
    /// this manager.
    #[track_caller]
    pub fn target_id(&self) -> Result<InstanceId, CoreError> {
        match self {
            Self::Resolved(target) => Ok(target.target_id()),
            Self::Unresolved(old) => Err(CoreError::contract(format!(
                "reference to old instance {old} was never linked"
            ))),
        }
    }
}

/// Mapping from instance ids found in a stream to the ids the reconstructed
/// objects received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapTable {
    map: BTreeMap<InstanceId, InstanceId>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: InstanceId, new: InstanceId) -> Result<(), CoreError> {
        if self.map.contains_key(&old) {
            return Err(CoreError::DuplicateInstance(old));
        }
        self.map.insert(old, new);
        Ok(())
    }

    pub fn get(&self, old: InstanceId) -> Option<InstanceId> {
        self.map.get(&old).copied()
    }

    pub fn resolve(&self, old: InstanceId) -> Result<InstanceId, CoreError> {
        self.get(old).ok_or(CoreError::DanglingReference(old))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, InstanceId)> + '_ {
        self.map.iter().map(|(old, new)| (*old, *new))
    }
}

/// What an object's `link` gets to resolve its references with.
pub struct LinkContext<'a> {
    pub manager: &'a ObjectManager,
    pub remap: &'a RemapTable,
}

impl<'a> LinkContext<'a> {
    pub fn new(manager: &'a ObjectManager, remap: &'a RemapTable) -> Self {
        Self { manager, remap }
    }

    /// Owning handle for the object that had id `old` in the stream.
    pub fn resolve_handle(&self, old: InstanceId) -> Result<Handle, CoreError> {
        let new = self.remap.resolve(old)?;
        self.manager
            .get_object(new)?
            .ok_or(CoreError::Released(new))
    }

    /// Weak handle for the object that had id `old` in the stream.
    pub fn resolve_weak(&self, old: InstanceId) -> Result<WeakHandle, CoreError> {
        let new = self.remap.resolve(old)?;
        self.manager.weak_handle(new)
    }
}

/// Back-relation from an attachable object to the single owner it belongs to.
///
/// Encoded as a 4-byte flag (`0` = no owner, `1` = owner follows) and, when
/// set, the owner's 4-byte instance id.
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    owner: Option<ObjectLink<WeakHandle>>,
}

impl Attachment {
    /// The owner, while it is still registered and owned.
    pub fn owner(&self) -> Option<&WeakHandle> {
        self.owner
            .as_ref()
            .and_then(ObjectLink::resolved)
            .filter(|owner| owner.is_live())
    }

    /// Whether an owner is set: still unlinked, or linked and live.
    pub fn is_attached(&self) -> bool {
        match &self.owner {
            None => false,
            Some(ObjectLink::Unresolved(_)) => true,
            Some(ObjectLink::Resolved(owner)) => owner.is_live(),
        }
    }

    /// Attach to `owner`.
    ///
    /// Fails if already attached to a different owner that is still live.
    #[track_caller]
    pub fn attach(&mut self, owner: WeakHandle) -> Result<(), CoreError> {
        if let Some(current) = self.owner() {
            if *current != owner {
                return Err(CoreError::contract(format!(
                    "already attached to owner {}",
                    current.instance_id()
                )));
            }
        }
        self.owner = Some(ObjectLink::Resolved(owner));
        Ok(())
    }

    pub fn detach(&mut self) -> Option<WeakHandle> {
        match self.owner.take() {
            Some(ObjectLink::Resolved(owner)) => Some(owner),
            _ => None,
        }
    }

    /// A released owner is not part of any snapshot, so it is written as no
    /// owner.
    pub fn write(&self, out: &mut ByteWriter) -> Result<(), CoreError> {
        let owner = match &self.owner {
            Some(ObjectLink::Resolved(owner)) if !owner.is_live() => None,
            Some(link) => Some(link.target_id()?),
            None => None,
        };
        match owner {
            None => out.write_i32(0),
            Some(id) => {
                out.write_i32(1);
                out.write_u32(id.0);
            }
        }
        Ok(())
    }

    pub fn read(&mut self, input: &mut ByteReader<'_>) -> Result<(), CoreError> {
        self.owner = match input.read_i32()? {
            0 => None,
            1 => Some(ObjectLink::Unresolved(InstanceId(input.read_u32()?))),
            flag => {
                return Err(CoreError::Malformed(format!("invalid owner flag {flag}")));
            }
        };
        Ok(())
    }

    pub fn link(&mut self, ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        if let Some(ObjectLink::Unresolved(old)) = self.owner {
            self.owner = Some(ObjectLink::Resolved(ctx.resolve_weak(old)?));
        }
        Ok(())
    }

    pub fn dump(&self, indent: usize, out: &mut dyn fmt::Write) -> fmt::Result {
        let pad = "    ".repeat(indent);
        match &self.owner {
            None => writeln!(out, "{pad}owner: none"),
            Some(ObjectLink::Resolved(owner)) if !owner.is_live() => {
                writeln!(out, "{pad}owner: released({})", owner.instance_id())
            }
            Some(ObjectLink::Resolved(owner)) => {
                writeln!(out, "{pad}owner: {}", owner.instance_id())
            }
            Some(ObjectLink::Unresolved(old)) => writeln!(out, "{pad}owner: unlinked({old})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_rejects_duplicates() {
        let mut remap = RemapTable::new();
        remap.insert(InstanceId(10), InstanceId(1)).unwrap();
        assert_eq!(
            remap.insert(InstanceId(10), InstanceId(2)).unwrap_err(),
            CoreError::DuplicateInstance(InstanceId(10))
        );
        assert_eq!(remap.resolve(InstanceId(10)).unwrap(), InstanceId(1));
    }

    #[test]
    fn remap_miss_is_a_dangling_reference() {
        let remap = RemapTable::new();
        assert_eq!(
            remap.resolve(InstanceId(4)).unwrap_err(),
            CoreError::DanglingReference(InstanceId(4))
        );
    }

    #[test]
    fn unresolved_link_cannot_be_written() {
        let link: ObjectLink<Handle> = ObjectLink::Unresolved(InstanceId(3));
        assert!(!link.is_resolved());
        assert!(link.target_id().is_err());
    }

    #[test]
    fn attachment_without_owner_round_trips() {
        let attachment = Attachment::default();
        let mut out = ByteWriter::new();
        attachment.write(&mut out).unwrap();
        assert_eq!(out.as_bytes(), &[0, 0, 0, 0]);

        let bytes = out.into_bytes();
        let mut read_back = Attachment::default();
        read_back.read(&mut ByteReader::new(&bytes)).unwrap();
        assert!(!read_back.is_attached());
    }

    #[test]
    fn attachment_reads_owner_as_unresolved() {
        let mut out = ByteWriter::new();
        out.write_i32(1);
        out.write_u32(77);
        let bytes = out.into_bytes();
        let mut attachment = Attachment::default();
        attachment.read(&mut ByteReader::new(&bytes)).unwrap();
        assert!(attachment.is_attached());
        assert!(attachment.owner().is_none());
    }

    #[test]
    fn invalid_owner_flag_is_malformed() {
        let mut out = ByteWriter::new();
        out.write_i32(7);
        let bytes = out.into_bytes();
        let mut attachment = Attachment::default();
        assert!(matches!(
            attachment.read(&mut ByteReader::new(&bytes)),
            Err(CoreError::Malformed(_))
        ));
    }
}
