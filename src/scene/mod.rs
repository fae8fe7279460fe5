//! Value-typed scene graph consumed by the baker.
//!
//! A [`Scene`] is a tree of named [`SceneObject`]s, each with a local
//! transform and an optional [`Mesh`]. The whole tree is plain data, so a
//! deep copy is just `Clone`; [`snapshot::capture`] builds on that.

mod mesh;
pub mod primitives;
pub mod snapshot;

pub use mesh::{Material, Mesh, VertexColors};
pub use snapshot::{capture, DrawBatch, Snapshot};

use glam::Mat4;

/// Node in the scene graph.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    pub name: String,
    /// Transform relative to the parent.
    pub transform: Mat4,
    /// Invisible objects (and their children) are not rendered.
    pub visible: bool,
    pub mesh: Option<Mesh>,
    pub children: Vec<SceneObject>,
}

impl SceneObject {
    /// Empty group node.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            visible: true,
            mesh: None,
            children: Vec::new(),
        }
    }

    /// Node carrying a mesh.
    pub fn mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self { mesh: Some(mesh), ..Self::group(name) }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: SceneObject) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: SceneObject) {
        self.children.push(child);
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Direct child by name.
    pub fn child_by_name(&self, name: &str) -> Option<&SceneObject> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Scene graph root.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    root: SceneObject,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self { root: SceneObject::group("") }
    }

    pub fn root(&self) -> &SceneObject {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut SceneObject {
        &mut self.root
    }

    /// Add a top-level object.
    pub fn add(&mut self, object: SceneObject) {
        self.root.add_child(object);
    }

    /// First object with the given name, depth-first.
    pub fn find(&self, name: &str) -> Option<&SceneObject> {
        fn visit<'a>(obj: &'a SceneObject, name: &str) -> Option<&'a SceneObject> {
            if obj.name == name {
                return Some(obj);
            }
            obj.children.iter().find_map(|c| visit(c, name))
        }
        visit(&self.root, name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut SceneObject> {
        self.find_with_world_mut(name).map(|(_, obj)| obj)
    }

    /// World transform of the first object with the given name.
    pub fn world_transform(&self, name: &str) -> Option<Mat4> {
        fn visit(obj: &SceneObject, parent: Mat4, name: &str) -> Option<Mat4> {
            let world = parent * obj.transform;
            if obj.name == name {
                return Some(world);
            }
            obj.children.iter().find_map(|c| visit(c, world, name))
        }
        visit(&self.root, Mat4::IDENTITY, name)
    }

    /// First object with the given name together with its world transform.
    pub fn find_with_world_mut(&mut self, name: &str) -> Option<(Mat4, &mut SceneObject)> {
        fn visit<'a>(
            obj: &'a mut SceneObject,
            parent: Mat4,
            name: &str,
        ) -> Option<(Mat4, &'a mut SceneObject)> {
            let world = parent * obj.transform;
            if obj.name == name {
                return Some((world, obj));
            }
            obj.children.iter_mut().find_map(|c| visit(c, world, name))
        }
        visit(&mut self.root, Mat4::IDENTITY, name)
    }

    /// Visit every visible mesh with its world transform, parents first.
    pub fn for_each_visible_mesh<F>(&self, mut f: F)
    where
        F: FnMut(&SceneObject, &Mesh, Mat4),
    {
        fn visit<F>(obj: &SceneObject, parent: Mat4, f: &mut F)
        where
            F: FnMut(&SceneObject, &Mesh, Mat4),
        {
            if !obj.visible {
                return;
            }
            let world = parent * obj.transform;
            if let Some(mesh) = &obj.mesh {
                f(obj, mesh, world);
            }
            for child in &obj.children {
                visit(child, world, f);
            }
        }
        visit(&self.root, Mat4::IDENTITY, &mut f);
    }

    /// Number of objects in the graph, root excluded.
    pub fn object_count(&self) -> usize {
        fn count(obj: &SceneObject) -> usize {
            obj.children.iter().map(|c| 1 + count(c)).sum()
        }
        count(&self.root)
    }
}
