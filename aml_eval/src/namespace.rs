use crate::{
    object::{Object, ObjectRef, ObjectTracker},
    AmlError,
};
use alloc::{
    collections::{BTreeMap, BTreeSet},
    string::{String, ToString},
    vec,
    vec::Vec,
};
use core::{fmt, str};

/// A handle is used to refer to a namespace node without borrowing it until you need to access it. They can
/// also be cached to avoid expensive namespace lookups.
///
/// Handles are never reused (the handle to a removed node will never be reused to point to a new node). This
/// ensures handles cached by the library consumer, or held by references, will never point to a node they did
/// not originally point to.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct AmlHandle(u32);

impl AmlHandle {
    pub(self) fn increment(&mut self) {
        self.0 += 1;
    }
}

/// Identifies the unit of AML that created a node: a loaded table, or a single invocation of a method.
/// Removing a group removes every node it created, along with anything defined beneath them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct LoadGroup(u32);

impl LoadGroup {
    /// The group the predefined objects belong to. It is never removed.
    pub const PREDEFINED: LoadGroup = LoadGroup(0);
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: NameSeg,
    pub parent: Option<AmlHandle>,
    /// Children in the order they were defined.
    pub children: Vec<AmlHandle>,
    pub object: ObjectRef,
    pub group: LoadGroup,
}

/// The maximum number of aliases followed when resolving a name. Firmware can define aliases to aliases,
/// and this stops a cycle of them hanging the interpreter.
const MAX_ALIAS_DEPTH: usize = 16;

pub struct Namespace {
    /// A running count of handles, which are never reused.
    next_handle: AmlHandle,
    next_group: LoadGroup,
    nodes: BTreeMap<AmlHandle, Node>,
    /// The nodes each removable group created, so removing a group doesn't search the whole namespace.
    group_members: BTreeMap<LoadGroup, Vec<AmlHandle>>,
    root: AmlHandle,
    tracker: ObjectTracker,
}

impl Namespace {
    /// Create a namespace containing the predefined scopes and objects. `os_name` is returned by `\_OS`.
    pub fn new(os_name: &'static str) -> Namespace {
        let tracker = ObjectTracker::new();
        let root = AmlHandle(0);
        let root_node = Node {
            name: NameSeg(*b"____"),
            parent: None,
            children: Vec::new(),
            object: tracker.wrap(Object::PredefinedScope),
            group: LoadGroup::PREDEFINED,
        };

        let mut namespace = Namespace {
            next_handle: AmlHandle(1),
            next_group: LoadGroup(1),
            nodes: BTreeMap::from([(root, root_node)]),
            group_members: BTreeMap::new(),
            root,
            tracker,
        };
        // The namespace is empty and the predefined methods take few arguments, so this can't fail
        let _ = namespace.add_predefined(os_name);
        namespace
    }

    fn add_predefined(&mut self, os_name: &'static str) -> Result<(), AmlError> {
        let predefined = [
            (*b"_GPE", Object::PredefinedScope),
            (*b"_PR_", Object::PredefinedScope),
            (*b"_SB_", Object::PredefinedScope),
            (*b"_SI_", Object::PredefinedScope),
            (*b"_TZ_", Object::PredefinedScope),
            (*b"_GL_", Object::Mutex { sync_level: 0, depth: 0 }),
            (*b"_OSI", Object::native_method(1, |_| Ok(Object::Integer(u64::MAX)))?),
            (*b"_REV", Object::native_method(0, |_| Ok(Object::Integer(2)))?),
            (*b"_OS_", Object::native_method(0, move |_| Ok(Object::String(os_name.to_string())))?),
        ];

        for (seg, object) in predefined {
            self.add_child(self.root, NameSeg(seg), object, LoadGroup::PREDEFINED)?;
        }
        Ok(())
    }

    pub fn tracker(&self) -> &ObjectTracker {
        &self.tracker
    }

    pub fn root(&self) -> AmlHandle {
        self.root
    }

    /// Allocate a new load group. Groups are never reused.
    pub fn new_group(&mut self) -> LoadGroup {
        let group = self.next_group;
        self.next_group.0 += 1;
        group
    }

    pub fn node(&self, handle: AmlHandle) -> Result<&Node, AmlError> {
        self.nodes.get(&handle).ok_or(AmlError::InvalidHandle(handle))
    }

    /// Get a shared handle to the object held by a node. Aliases are not followed - use `search` to resolve a
    /// name to the node an alias points at.
    pub fn get(&self, handle: AmlHandle) -> Result<ObjectRef, AmlError> {
        Ok(self.node(handle)?.object.share())
    }

    /// Replace the object held by a node, returning the old one.
    pub fn replace(&mut self, handle: AmlHandle, object: ObjectRef) -> Result<ObjectRef, AmlError> {
        let node = self.nodes.get_mut(&handle).ok_or(AmlError::InvalidHandle(handle))?;
        Ok(core::mem::replace(&mut node.object, object))
    }

    pub fn child(&self, parent: AmlHandle, seg: NameSeg) -> Option<AmlHandle> {
        let node = self.nodes.get(&parent)?;
        node.children.iter().copied().find(|child| self.nodes.get(child).map(|node| node.name) == Some(seg))
    }

    /// Add a new node named `seg` beneath `parent`. Fails with `NameCollision` if `parent` already has a
    /// child with that name.
    pub fn add_child(
        &mut self,
        parent: AmlHandle,
        seg: NameSeg,
        object: Object,
        group: LoadGroup,
    ) -> Result<AmlHandle, AmlError> {
        let object = self.tracker.wrap(object);
        self.add_child_ref(parent, seg, object, group)
    }

    pub fn add_child_ref(
        &mut self,
        parent: AmlHandle,
        seg: NameSeg,
        object: ObjectRef,
        group: LoadGroup,
    ) -> Result<AmlHandle, AmlError> {
        if self.child(parent, seg).is_some() {
            let mut path = self.path_of(parent)?;
            path.push(seg);
            return Err(AmlError::NameCollision(path));
        }

        let handle = self.next_handle;
        self.next_handle.increment();

        self.nodes
            .get_mut(&parent)
            .ok_or(AmlError::InvalidHandle(parent))?
            .children
            .push(handle);
        self.nodes.insert(handle, Node { name: seg, parent: Some(parent), children: Vec::new(), object, group });
        if group != LoadGroup::PREDEFINED {
            self.group_members.entry(group).or_default().push(handle);
        }
        Ok(handle)
    }

    /// Add a node at an absolute path. Every node along the path, apart from the last, must already exist.
    pub fn insert(&mut self, path: &AmlName, object: Object, group: LoadGroup) -> Result<AmlHandle, AmlError> {
        let (parent, last_seg) = self.parent_of_path(path)?;
        self.add_child(parent, last_seg, object, group)
    }

    /// Split an absolute path into the handle of the node that should contain it, and its last segment.
    pub fn parent_of_path(&self, path: &AmlName) -> Result<(AmlHandle, NameSeg), AmlError> {
        let path = path.clone().normalize()?;
        let last_seg = path.last_segment().ok_or(AmlError::RootHasNoParent)?;
        let parent = self.lookup(&path.parent()?)?;
        Ok((parent, last_seg))
    }

    /// Find the node at an absolute path, without applying any search rules.
    pub fn lookup(&self, path: &AmlName) -> Result<AmlHandle, AmlError> {
        if !path.is_absolute() {
            return Err(AmlError::InvalidName(Some(path.clone())));
        }
        let path = path.clone().normalize()?;

        let mut current = self.root;
        for component in &path.0[1..] {
            let seg = component.as_segment().map_err(|_| AmlError::InvalidNormalizedName(path.clone()))?;
            current = self.child(current, seg).ok_or_else(|| AmlError::ObjectDoesNotExist(path.clone()))?;
        }
        Ok(current)
    }

    /// Search for an object at the given path of the namespace, applying the search rules described in §5.3 of
    /// the ACPI specification, if they are applicable. Aliases are followed, so the handle returned is always
    /// of the node that actually holds the object.
    pub fn search(&self, path: &AmlName, starting_scope: &AmlName) -> Result<AmlHandle, AmlError> {
        let handle = self.search_no_alias(path, starting_scope)?;
        self.follow_aliases(handle)
    }

    fn search_no_alias(&self, path: &AmlName, starting_scope: &AmlName) -> Result<AmlHandle, AmlError> {
        if !path.search_rules_apply() {
            return self.lookup(&path.resolve(starting_scope)?);
        }

        let seg = path.last_segment().ok_or(AmlError::EmptyNamesAreInvalid)?;
        let mut scope = starting_scope.clone().normalize()?;
        loop {
            /*
             * The starting scope doesn't have to exist. Names returned by methods are resolved from the point
             * of view of the method, whose dynamically created objects have since been removed, so a missing
             * level just moves the search up to its parent.
             */
            if let Ok(scope_handle) = self.lookup(&scope) {
                if let Some(handle) = self.child(scope_handle, seg) {
                    return Ok(handle);
                }
            }

            match scope.parent() {
                Ok(parent) => scope = parent,
                Err(AmlError::RootHasNoParent) => return Err(AmlError::ObjectDoesNotExist(path.clone())),
                Err(err) => return Err(err),
            }
        }
    }

    pub fn follow_aliases(&self, mut handle: AmlHandle) -> Result<AmlHandle, AmlError> {
        for _ in 0..MAX_ALIAS_DEPTH {
            let target = match *self.node(handle)?.object.lock() {
                Object::Alias(target) => target,
                _ => return Ok(handle),
            };
            handle = target;
        }
        Err(AmlError::AliasLoop(self.path_of(handle)?))
    }

    /// Build the absolute path of a node.
    pub fn path_of(&self, mut handle: AmlHandle) -> Result<AmlName, AmlError> {
        let mut segments = Vec::new();
        loop {
            let node = self.node(handle)?;
            match node.parent {
                Some(parent) => {
                    segments.push(NameComponent::Segment(node.name));
                    handle = parent;
                }
                None => break,
            }
        }
        segments.push(NameComponent::Root);
        segments.reverse();
        Ok(AmlName(segments))
    }

    /// Remove every node created by `group`, along with its whole subtree. Objects held by the removed nodes
    /// are released; references that point at them by handle will now fail to resolve.
    pub fn remove_subtree_by_group(&mut self, group: LoadGroup) {
        let Some(members) = self.group_members.remove(&group) else { return };

        for handle in members {
            // Already gone if it was beneath a node removed earlier
            let Some(node) = self.nodes.get(&handle) else { continue };
            if let Some(parent) = node.parent {
                if let Some(parent) = self.nodes.get_mut(&parent) {
                    parent.children.retain(|&child| child != handle);
                }
            }
            self.remove_detached(handle);
        }
    }

    fn remove_detached(&mut self, handle: AmlHandle) {
        let mut to_remove = vec![handle];
        while let Some(handle) = to_remove.pop() {
            if let Some(node) = self.nodes.remove(&handle) {
                to_remove.extend(node.children);
            }
        }
    }

    /// Traverse the namespace depth-first, in definition order, calling `f` on each node below the root. `f`
    /// returns a `Result<bool, AmlError>` - errors terminate the traversal and are propagated, and the `bool` on
    /// the successful path marks whether the children of the node should also be traversed.
    pub fn traverse<F>(&self, mut f: F) -> Result<(), AmlError>
    where
        F: FnMut(&AmlName, AmlHandle, &Node) -> Result<bool, AmlError>,
    {
        fn traverse_node<F>(namespace: &Namespace, handle: AmlHandle, path: &AmlName, f: &mut F) -> Result<(), AmlError>
        where
            F: FnMut(&AmlName, AmlHandle, &Node) -> Result<bool, AmlError>,
        {
            for &child in &namespace.node(handle)?.children {
                let node = namespace.node(child)?;
                let mut child_path = path.clone();
                child_path.push(node.name);

                if f(&child_path, child, node)? {
                    traverse_node(namespace, child, &child_path, f)?;
                }
            }
            Ok(())
        }

        traverse_node(self, self.root, &AmlName::root(), &mut f)
    }

    /// Count the distinct objects reachable from the namespace: everything held by a node, along with the
    /// elements of packages, the targets of index references, and the buffers and regions behind fields.
    pub fn reachable_objects(&self) -> usize {
        let mut seen = BTreeSet::new();
        let mut to_visit: Vec<ObjectRef> = self.nodes.values().map(|node| node.object.share()).collect();

        while let Some(object) = to_visit.pop() {
            if !seen.insert(object.addr()) {
                continue;
            }
            object.lock().for_each_held(&mut |held| to_visit.push(held.share()));
        }

        seen.len()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const INDENT_PER_LEVEL: usize = 4;

        fn print_node(
            namespace: &Namespace,
            f: &mut fmt::Formatter<'_>,
            name: &str,
            handle: AmlHandle,
            indent: usize,
        ) -> fmt::Result {
            let Some(node) = namespace.nodes.get(&handle) else { return Ok(()) };
            writeln!(f, "{:indent$}{}: {}", "", name, node.object, indent = indent)?;

            for child in &node.children {
                if let Some(child_node) = namespace.nodes.get(child) {
                    print_node(namespace, f, child_node.name.as_str(), *child, indent + INDENT_PER_LEVEL)?;
                }
            }

            Ok(())
        }

        print_node(self, f, "\\", self.root, 0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct AmlName(Vec<NameComponent>);

impl AmlName {
    pub fn root() -> AmlName {
        AmlName(vec![NameComponent::Root])
    }

    /// The null name, which refers to the current scope.
    pub fn null() -> AmlName {
        AmlName(Vec::new())
    }

    pub fn from_name_seg(seg: NameSeg) -> AmlName {
        AmlName(vec![NameComponent::Segment(seg)])
    }

    pub fn from_components(components: Vec<NameComponent>) -> AmlName {
        AmlName(components)
    }

    /// Convert a string representation of an AML name into an `AmlName`.
    pub fn from_str(mut string: &str) -> Result<AmlName, AmlError> {
        if string.is_empty() {
            return Err(AmlError::EmptyNamesAreInvalid);
        }

        let mut components = Vec::new();

        // If it starts with a \, make it an absolute name
        if let Some(rest) = string.strip_prefix('\\') {
            components.push(NameComponent::Root);
            string = rest;
        }

        if !string.is_empty() {
            // Divide the rest of it into segments, and parse those
            for mut part in string.split('.') {
                // Handle prefix chars
                while let Some(rest) = part.strip_prefix('^') {
                    components.push(NameComponent::Prefix);
                    part = rest;
                }

                components.push(NameComponent::Segment(NameSeg::from_str(part)?));
            }
        }

        Ok(AmlName(components))
    }

    pub fn as_string(&self) -> String {
        self.0
            .iter()
            .fold(String::new(), |name, component| match component {
                NameComponent::Root => name + "\\",
                NameComponent::Prefix => name + "^",
                NameComponent::Segment(seg) => name + seg.as_str() + ".",
            })
            .trim_end_matches('.')
            .to_string()
    }

    pub fn components(&self) -> &[NameComponent] {
        &self.0
    }

    pub fn push(&mut self, seg: NameSeg) {
        self.0.push(NameComponent::Segment(seg));
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last_segment(&self) -> Option<NameSeg> {
        match self.0.last() {
            Some(NameComponent::Segment(seg)) => Some(*seg),
            _ => None,
        }
    }

    /// An AML path is normal if it does not contain any prefix elements ("^" characters, when
    /// expressed as a string).
    pub fn is_normal(&self) -> bool {
        !self.0.contains(&NameComponent::Prefix)
    }

    pub fn is_absolute(&self) -> bool {
        self.0.first() == Some(&NameComponent::Root)
    }

    /// Special rules apply when searching for certain paths (specifically, those that are made up
    /// of a single name segment). Returns `true` if those rules apply.
    pub fn search_rules_apply(&self) -> bool {
        matches!(self.0[..], [NameComponent::Segment(_)])
    }

    /// Normalize an AML path, resolving prefix chars. Returns `AmlError::InvalidNormalizedName` if the path
    /// normalizes to an invalid path (e.g. `\^_FOO`)
    pub fn normalize(self) -> Result<AmlName, AmlError> {
        if self.is_normal() {
            return Ok(self);
        }

        let mut normalized = Vec::with_capacity(self.0.len());
        for &component in &self.0 {
            match component {
                NameComponent::Segment(_) | NameComponent::Root => normalized.push(component),
                NameComponent::Prefix => match normalized.last() {
                    Some(NameComponent::Segment(_)) => {
                        normalized.pop();
                    }
                    _ => return Err(AmlError::InvalidNormalizedName(self.clone())),
                },
            }
        }

        Ok(AmlName(normalized))
    }

    /// Get the parent of this `AmlName`. For example, the parent of `\_SB.PCI0._PRT` is `\_SB.PCI0`. The root
    /// path has no parent, and so returns `RootHasNoParent`.
    pub fn parent(&self) -> Result<AmlName, AmlError> {
        let mut normalized_self = self.clone().normalize()?;

        match normalized_self.0.last() {
            None | Some(NameComponent::Root) => Err(AmlError::RootHasNoParent),
            Some(NameComponent::Segment(_)) => {
                normalized_self.0.pop();
                Ok(normalized_self)
            }
            // Prefix chars are removed by normalization
            Some(NameComponent::Prefix) => Err(AmlError::InvalidNormalizedName(self.clone())),
        }
    }

    /// Resolve this path against a given scope, making it absolute. If the path is absolute, it is
    /// returned directly. The path is also normalized.
    pub fn resolve(&self, scope: &AmlName) -> Result<AmlName, AmlError> {
        if self.is_absolute() {
            return self.clone().normalize();
        }
        if !scope.is_absolute() {
            return Err(AmlError::InvalidName(Some(scope.clone())));
        }

        let mut resolved_path = scope.clone();
        resolved_path.0.extend_from_slice(&(self.0));
        resolved_path.normalize()
    }
}

impl fmt::Display for AmlName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum NameComponent {
    Root,
    Prefix,
    Segment(NameSeg),
}

impl NameComponent {
    pub fn as_segment(self) -> Result<NameSeg, ()> {
        match self {
            NameComponent::Segment(seg) => Ok(seg),
            NameComponent::Root | NameComponent::Prefix => Err(()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameSeg(pub(crate) [u8; 4]);

impl NameSeg {
    /// Make a `NameSeg` from the four bytes it is encoded as in AML, checking they are valid name characters.
    pub fn from_bytes(bytes: [u8; 4]) -> Result<NameSeg, AmlError> {
        if !is_lead_name_char(bytes[0]) || !bytes[1..].iter().all(|&b| is_name_char(b)) {
            return Err(AmlError::InvalidNameSeg);
        }
        Ok(NameSeg(bytes))
    }

    pub fn from_str(string: &str) -> Result<NameSeg, AmlError> {
        // Each NameSeg can only have four chars, and must have at least one
        if string.is_empty() || string.len() > 4 {
            return Err(AmlError::InvalidNameSeg);
        }

        // We pre-fill the array with '_', so it will already be correct if the length is < 4
        let mut seg = [b'_'; 4];
        seg[..string.len()].copy_from_slice(string.as_bytes());
        NameSeg::from_bytes(seg)
    }

    pub fn as_str(&self) -> &str {
        /*
         * This is safe, because we always check that all the bytes are valid ASCII, so every
         * `NameSeg` will be valid UTF8.
         */
        unsafe { str::from_utf8_unchecked(&self.0) }
    }
}

// A list of ASCII codes is pretty much never useful, so we always just show it as a string
impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

pub fn is_lead_name_char(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte == b'_'
}

pub fn is_name_char(byte: u8) -> bool {
    is_lead_name_char(byte) || byte.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Method, MethodCode};
    use alloc::format;

    fn name(string: &str) -> AmlName {
        AmlName::from_str(string).unwrap()
    }

    #[test]
    fn test_aml_name_from_str() {
        assert_eq!(AmlName::from_str(""), Err(AmlError::EmptyNamesAreInvalid));
        assert_eq!(AmlName::from_str("\\"), Ok(AmlName::root()));
        assert_eq!(
            AmlName::from_str("\\_SB.PCI0"),
            Ok(AmlName(vec![
                NameComponent::Root,
                NameComponent::Segment(NameSeg([b'_', b'S', b'B', b'_'])),
                NameComponent::Segment(NameSeg([b'P', b'C', b'I', b'0']))
            ]))
        );
        assert_eq!(
            AmlName::from_str("\\_SB.^^^PCI0"),
            Ok(AmlName(vec![
                NameComponent::Root,
                NameComponent::Segment(NameSeg([b'_', b'S', b'B', b'_'])),
                NameComponent::Prefix,
                NameComponent::Prefix,
                NameComponent::Prefix,
                NameComponent::Segment(NameSeg([b'P', b'C', b'I', b'0']))
            ]))
        );
        assert_eq!(AmlName::from_str("\\_SB.pci0"), Err(AmlError::InvalidNameSeg));
        assert_eq!(AmlName::from_str("\\_SB.TOOLONG"), Err(AmlError::InvalidNameSeg));
    }

    #[test]
    fn name_seg_validation() {
        assert_eq!(NameSeg::from_str("_SB"), Ok(NameSeg(*b"_SB_")));
        assert_eq!(NameSeg::from_bytes(*b"0ABC"), Err(AmlError::InvalidNameSeg));
        assert_eq!(NameSeg::from_bytes(*b"AB-C"), Err(AmlError::InvalidNameSeg));
        assert_eq!(NameSeg::from_bytes(*b"A9_Z").map(|seg| seg.as_str().to_string()), Ok("A9_Z".to_string()));
    }

    #[test]
    fn test_is_normal() {
        assert_eq!(AmlName::root().is_normal(), true);
        assert_eq!(name("\\_SB.PCI0.VGA").is_normal(), true);
        assert_eq!(name("\\_SB.^PCI0.VGA").is_normal(), false);
        assert_eq!(name("\\^_SB.^^PCI0.VGA").is_normal(), false);
        assert_eq!(name("_SB.^^PCI0.VGA").is_normal(), false);
        assert_eq!(name("_SB.PCI0.VGA").is_normal(), true);
    }

    #[test]
    fn test_normalization() {
        assert_eq!(name("\\_SB.PCI0").normalize(), Ok(name("\\_SB.PCI0")));
        assert_eq!(name("\\_SB.^PCI0").normalize(), Ok(name("\\PCI0")));
        assert_eq!(name("\\_SB.PCI0.^^FOO").normalize(), Ok(name("\\FOO")));
        assert_eq!(name("_SB.PCI0.^FOO.BAR").normalize(), Ok(name("_SB.FOO.BAR")));
        assert_eq!(name("\\^_SB").normalize(), Err(AmlError::InvalidNormalizedName(name("\\^_SB"))));
        assert_eq!(
            name("\\_SB.PCI0.FOO.^^^^BAR").normalize(),
            Err(AmlError::InvalidNormalizedName(name("\\_SB.PCI0.FOO.^^^^BAR")))
        );
    }

    #[test]
    fn test_is_absolute() {
        assert_eq!(AmlName::root().is_absolute(), true);
        assert_eq!(name("\\_SB.PCI0.VGA").is_absolute(), true);
        assert_eq!(name("\\^_SB.^^PCI0.VGA").is_absolute(), true);
        assert_eq!(name("_SB.^^PCI0.VGA").is_absolute(), false);
        assert_eq!(AmlName::null().is_absolute(), false);
    }

    #[test]
    fn test_search_rules_apply() {
        assert_eq!(AmlName::root().search_rules_apply(), false);
        assert_eq!(AmlName::null().search_rules_apply(), false);
        assert_eq!(name("\\_SB").search_rules_apply(), false);
        assert_eq!(name("^VGA").search_rules_apply(), false);
        assert_eq!(name("_SB.PCI0.VGA").search_rules_apply(), false);
        assert_eq!(name("VGA").search_rules_apply(), true);
        assert_eq!(name("_SB").search_rules_apply(), true);
    }

    #[test]
    fn test_aml_name_parent() {
        assert_eq!(name("\\").parent(), Err(AmlError::RootHasNoParent));
        assert_eq!(name("\\_SB").parent(), Ok(AmlName::root()));
        assert_eq!(name("\\_SB.PCI0").parent(), Ok(name("\\_SB")));
        assert_eq!(name("\\_SB.PCI0").parent().unwrap().parent(), Ok(AmlName::root()));
    }

    #[test]
    fn null_name_resolves_to_scope() {
        assert_eq!(AmlName::null().resolve(&name("\\_SB.PCI0")), Ok(name("\\_SB.PCI0")));
        assert_eq!(name("^FOO").resolve(&name("\\_SB.PCI0")), Ok(name("\\_SB.FOO")));
        assert_eq!(name("FOO").resolve(&name("_SB")), Err(AmlError::InvalidName(Some(name("_SB")))));
    }

    #[test]
    fn predefined_objects() {
        let namespace = Namespace::new("Test OS");
        for path in ["\\_GPE", "\\_PR_", "\\_SB_", "\\_SI_", "\\_TZ_"] {
            let handle = namespace.lookup(&name(path)).unwrap();
            assert!(matches!(*namespace.get(handle).unwrap().lock(), Object::PredefinedScope));
        }
        let gl = namespace.lookup(&name("\\_GL")).unwrap();
        assert!(matches!(*namespace.get(gl).unwrap().lock(), Object::Mutex { sync_level: 0, .. }));

        let os = namespace.lookup(&name("\\_OS")).unwrap();
        let Object::Method(Method { code: MethodCode::Native(f), .. }) = namespace.get(os).unwrap().snapshot() else {
            panic!()
        };
        assert!(matches!(f(&[]), Ok(Object::String(s)) if s == "Test OS"));
    }

    #[test]
    fn name_collisions_are_per_scope() {
        let mut namespace = Namespace::new("");
        let group = namespace.new_group();
        let sb = namespace.lookup(&name("\\_SB")).unwrap();

        assert!(namespace.insert(&name("\\FOO"), Object::Integer(1), group).is_ok());
        assert!(namespace.add_child(sb, NameSeg::from_str("FOO").unwrap(), Object::Integer(2), group).is_ok());
        assert_eq!(
            namespace.add_child(sb, NameSeg::from_str("FOO").unwrap(), Object::Integer(3), group),
            Err(AmlError::NameCollision(name("\\_SB.FOO")))
        );
        assert_eq!(
            namespace.insert(&name("\\BAR.BAZ"), Object::Integer(4), group),
            Err(AmlError::ObjectDoesNotExist(name("\\BAR")))
        );
    }

    #[test]
    fn search_rules_find_nearest_definition() {
        let mut namespace = Namespace::new("");
        let group = namespace.new_group();
        namespace.insert(&name("\\_SB.FOO"), Object::Integer(1), group).unwrap();
        namespace.insert(&name("\\_SB.PCI0"), Object::Device, group).unwrap();
        let inner = namespace.insert(&name("\\_SB.PCI0.FOO"), Object::Integer(2), group).unwrap();
        namespace.insert(&name("\\_SB.PCI0.SBRG"), Object::Device, group).unwrap();
        namespace.insert(&name("\\MOO"), Object::Integer(3), group).unwrap();

        assert_eq!(namespace.search(&name("FOO"), &name("\\_SB.PCI0")), Ok(inner));
        assert_eq!(namespace.search(&name("FOO"), &name("\\_SB.PCI0.SBRG")), Ok(inner));
        assert_eq!(namespace.path_of(namespace.search(&name("FOO"), &name("\\_SB")).unwrap()), Ok(name("\\_SB.FOO")));
        assert_eq!(namespace.path_of(namespace.search(&name("MOO"), &name("\\_SB.PCI0")).unwrap()), Ok(name("\\MOO")));

        // Multi-segment names are resolved against the scope, without searching
        assert_eq!(
            namespace.search(&name("PCI0.FOO"), &name("\\_SB.PCI0")),
            Err(AmlError::ObjectDoesNotExist(name("\\_SB.PCI0.PCI0.FOO")))
        );

        // Missing levels in the starting scope are skipped over
        assert_eq!(namespace.search(&name("FOO"), &name("\\_SB.PCI0.GONE.AWAY")), Ok(inner));
        assert_eq!(namespace.search(&name("NONE"), &name("\\_SB")), Err(AmlError::ObjectDoesNotExist(name("NONE"))));
    }

    #[test]
    fn aliases_are_followed() {
        let mut namespace = Namespace::new("");
        let group = namespace.new_group();
        let target = namespace.insert(&name("\\_SB.TARG"), Object::Integer(9), group).unwrap();
        namespace.insert(&name("\\ALS0"), Object::Alias(target), group).unwrap();
        let a1 = namespace.insert(&name("\\ALS1"), Object::Uninitialized, group).unwrap();
        let a2 = namespace.insert(&name("\\ALS2"), Object::Alias(a1), group).unwrap();
        *namespace.get(a1).unwrap().lock() = Object::Alias(a2);

        assert_eq!(namespace.search(&name("ALS0"), &name("\\_SB")), Ok(target));
        assert!(matches!(namespace.search(&name("\\ALS1"), &AmlName::root()), Err(AmlError::AliasLoop(_))));
    }

    #[test]
    fn removing_a_group_removes_subtrees() {
        let mut namespace = Namespace::new("");
        let table = namespace.new_group();
        let other = namespace.new_group();

        namespace.insert(&name("\\_SB.PCI0"), Object::Device, table).unwrap();
        namespace.insert(&name("\\_SB.PCI0.FOO"), Object::Integer(1), other).unwrap();
        namespace.insert(&name("\\BAR"), Object::String("bar".into()), table).unwrap();
        namespace.insert(&name("\\BAZ"), Object::Integer(2), other).unwrap();

        let live_before = namespace.tracker().live();
        namespace.remove_subtree_by_group(table);

        assert!(namespace.lookup(&name("\\_SB.PCI0")).is_err());
        assert!(namespace.lookup(&name("\\_SB.PCI0.FOO")).is_err());
        assert!(namespace.lookup(&name("\\BAR")).is_err());
        assert!(namespace.lookup(&name("\\BAZ")).is_ok());
        assert_eq!(namespace.tracker().live(), live_before - 3);
        assert_eq!(namespace.tracker().live(), namespace.reachable_objects());
    }

    #[test]
    fn removing_a_group_below_a_removed_group() {
        let mut namespace = Namespace::new("");
        let table = namespace.new_group();
        let method = namespace.new_group();
        let unrelated = namespace.new_group();

        namespace.insert(&name("\\_SB.DEV0"), Object::Device, table).unwrap();
        namespace.insert(&name("\\_SB.DEV0.TMP0"), Object::Integer(1), method).unwrap();
        namespace.insert(&name("\\_SB.DEV1"), Object::Device, unrelated).unwrap();
        namespace.insert(&name("\\_SB.DEV1.TMP0"), Object::Integer(2), method).unwrap();

        namespace.remove_subtree_by_group(table);
        assert!(namespace.lookup(&name("\\_SB.DEV0.TMP0")).is_err());
        assert!(namespace.lookup(&name("\\_SB.DEV1.TMP0")).is_ok());

        namespace.remove_subtree_by_group(method);
        assert!(namespace.lookup(&name("\\_SB.DEV1.TMP0")).is_err());
        assert!(namespace.lookup(&name("\\_SB.DEV1")).is_ok());
        assert!(!namespace.group_members.contains_key(&method));

        // Removing a group again, or one that never created anything, does nothing
        namespace.remove_subtree_by_group(method);
        let empty = namespace.new_group();
        namespace.remove_subtree_by_group(empty);
        assert!(namespace.lookup(&name("\\_SB.DEV1")).is_ok());
        assert_eq!(namespace.tracker().live(), namespace.reachable_objects());
    }

    #[test]
    fn handles_are_never_reused() {
        let mut namespace = Namespace::new("");
        let group = namespace.new_group();
        let first = namespace.insert(&name("\\FOO"), Object::Integer(1), group).unwrap();
        namespace.remove_subtree_by_group(group);

        let group = namespace.new_group();
        let second = namespace.insert(&name("\\FOO"), Object::Integer(1), group).unwrap();
        assert_ne!(first, second);
        assert_eq!(namespace.node(first).map(|_| ()), Err(AmlError::InvalidHandle(first)));
    }

    #[test]
    fn traversal_is_in_definition_order() {
        let mut namespace = Namespace::new("");
        let group = namespace.new_group();
        namespace.insert(&name("\\_SB.ZZZ0"), Object::Device, group).unwrap();
        namespace.insert(&name("\\_SB.AAA0"), Object::Device, group).unwrap();
        namespace.insert(&name("\\_SB.AAA0.CHLD"), Object::Device, group).unwrap();

        let mut visited = Vec::new();
        namespace
            .traverse(|path, _, node| {
                if matches!(*node.object.lock(), Object::Device) {
                    visited.push(path.as_string());
                }
                Ok(path.as_string() != "\\_SB_.AAA0")
            })
            .unwrap();
        assert_eq!(visited, vec!["\\_SB_.ZZZ0".to_string(), "\\_SB_.AAA0".to_string()]);
    }

    #[test]
    fn tree_printing() {
        let mut namespace = Namespace::new("");
        let group = namespace.new_group();
        namespace.insert(&name("\\_SB.PCI0"), Object::Device, group).unwrap();
        namespace.insert(&name("\\_SB.PCI0._ADR"), Object::Integer(0), group).unwrap();

        let printed = format!("{:?}", namespace);
        assert!(printed.starts_with("\\: PredefinedScope\n"));
        assert!(printed.contains("\n    _SB_: PredefinedScope\n        PCI0: Device\n            _ADR: Integer(0x0)\n"));
    }
}
