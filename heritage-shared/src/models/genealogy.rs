/// Genealogy trees and their members
///
/// Members form a forest through a nullable `parent_id` that always points
/// inside the same tree. Deleting a member turns its children into roots
/// (`ON DELETE SET NULL`).
///
/// [`build_forest`] turns the flat member rows of a tree into nested
/// [`TreeNode`]s; [`would_create_cycle`] guards parent changes.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use heritage_shared::models::genealogy::would_create_cycle;
/// use uuid::Uuid;
///
/// let (grandma, mom, me) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
/// let parents = HashMap::from([(grandma, None), (mom, Some(grandma)), (me, Some(mom))]);
///
/// // Grandma cannot become her granddaughter's child
/// assert!(would_create_cycle(&parents, grandma, me));
/// assert!(!would_create_cycle(&parents, me, grandma));
/// ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const MEMBER_COLUMNS: &str = "id, tree_id, parent_id, first_name, last_name, gender, birth_date, \
                              death_date, birth_place, bio, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Default for Gender {
    fn default() -> Self {
        Gender::Unknown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GenealogyTree {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TreeMember {
    pub id: Uuid,
    pub tree_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub gender: Gender,
    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Member fields as supplied on create, or after merging an update
#[derive(Debug, Clone, Default)]
pub struct MemberFields {
    pub parent_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub gender: Gender,
    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
    pub bio: Option<String>,
}

impl MemberFields {
    /// Death may not precede birth
    pub fn dates_consistent(&self) -> bool {
        match (self.birth_date, self.death_date) {
            (Some(birth), Some(death)) => death >= birth,
            _ => true,
        }
    }
}

impl From<TreeMember> for MemberFields {
    fn from(member: TreeMember) -> Self {
        Self {
            parent_id: member.parent_id,
            first_name: member.first_name,
            last_name: member.last_name,
            gender: member.gender,
            birth_date: member.birth_date,
            death_date: member.death_date,
            birth_place: member.birth_place,
            bio: member.bio,
        }
    }
}

/// A member with its descendants
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub member: TreeMember,
    pub children: Vec<TreeNode>,
}

// Dropping nested Vecs recurses once per generation
impl Drop for TreeNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// A tree with its members nested under their parents
#[derive(Debug, Clone, Serialize)]
pub struct TreeDetail {
    #[serde(flatten)]
    pub tree: GenealogyTree,
    pub member_count: usize,
    pub roots: Vec<TreeNode>,
}

/// Sibling order: birth date (unknown last), then first and last name
fn sibling_order(a: &TreeMember, b: &TreeMember) -> std::cmp::Ordering {
    let by_birth = match (a.birth_date, b.birth_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    };

    by_birth
        .then_with(|| a.first_name.cmp(&b.first_name))
        .then_with(|| a.last_name.cmp(&b.last_name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Builds a forest from flat member rows
///
/// Roots are members without a parent or whose parent is not among `members`.
/// Members caught in a parent cycle are unreachable from any root; they are
/// promoted to roots once each so nothing is lost and nothing is emitted twice.
pub fn build_forest(members: Vec<TreeMember>) -> Vec<TreeNode> {
    let ids: HashSet<Uuid> = members.iter().map(|m| m.id).collect();

    let mut children: HashMap<Uuid, Vec<TreeMember>> = HashMap::new();
    let mut roots: Vec<TreeMember> = Vec::new();

    for member in members {
        match member.parent_id {
            Some(parent) if ids.contains(&parent) && parent != member.id => {
                children.entry(parent).or_default().push(member)
            }
            _ => roots.push(member),
        }
    }

    for siblings in children.values_mut() {
        siblings.sort_by(sibling_order);
    }
    roots.sort_by(sibling_order);

    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut forest: Vec<TreeNode> = roots
        .into_iter()
        .filter_map(|root| attach(root, &mut children, &mut visited))
        .collect();

    // Whatever is left hangs off a cycle
    loop {
        let next = children
            .values()
            .flatten()
            .filter(|m| !visited.contains(&m.id))
            .min_by(|a, b| sibling_order(a, b))
            .map(|m| m.id);

        let Some(member) = next.and_then(|id| take_member(&mut children, id)) else {
            break;
        };
        if let Some(node) = attach(member, &mut children, &mut visited) {
            forest.push(node);
        }
    }

    forest
}

fn take_member(children: &mut HashMap<Uuid, Vec<TreeMember>>, id: Uuid) -> Option<TreeMember> {
    children.values_mut().find_map(|siblings| {
        siblings
            .iter()
            .position(|m| m.id == id)
            .map(|pos| siblings.remove(pos))
    })
}

/// A member whose children are still being attached
struct Pending {
    member: TreeMember,
    kids: std::vec::IntoIter<TreeMember>,
    built: Vec<TreeNode>,
}

impl Pending {
    fn open(member: TreeMember, children: &mut HashMap<Uuid, Vec<TreeMember>>) -> Self {
        let kids = children.remove(&member.id).unwrap_or_default().into_iter();
        Self {
            member,
            kids,
            built: Vec::new(),
        }
    }
}

/// Depth-first assembly with an explicit stack; lineages can be arbitrarily deep
fn attach(
    root: TreeMember,
    children: &mut HashMap<Uuid, Vec<TreeMember>>,
    visited: &mut HashSet<Uuid>,
) -> Option<TreeNode> {
    if !visited.insert(root.id) {
        return None;
    }

    let mut stack = vec![Pending::open(root, children)];

    loop {
        let top = stack.last_mut()?;

        match top.kids.next() {
            Some(kid) => {
                if visited.insert(kid.id) {
                    stack.push(Pending::open(kid, children));
                }
            }
            None => {
                let done = stack.pop()?;
                let node = TreeNode {
                    member: done.member,
                    children: done.built,
                };
                match stack.last_mut() {
                    Some(parent) => parent.built.push(node),
                    None => return Some(node),
                }
            }
        }
    }
}

/// Whether making `new_parent` the parent of `member` closes a loop
///
/// `parents` maps each member of the tree to its current parent.
pub fn would_create_cycle(
    parents: &HashMap<Uuid, Option<Uuid>>,
    member: Uuid,
    new_parent: Uuid,
) -> bool {
    let mut seen = HashSet::new();
    let mut current = Some(new_parent);

    while let Some(id) = current {
        if id == member {
            return true;
        }
        if !seen.insert(id) {
            // Pre-existing loop that does not pass through `member`
            return false;
        }
        current = parents.get(&id).copied().flatten();
    }

    false
}

impl GenealogyTree {
    pub async fn create(
        pool: &PgPool,
        family_id: Uuid,
        name: &str,
        description: Option<String>,
        created_by: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GenealogyTree>(
            r#"
            INSERT INTO genealogy_trees (family_id, name, description, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, family_id, name, description, created_by, created_at, updated_at
            "#,
        )
        .bind(family_id)
        .bind(name.trim())
        .bind(description)
        .bind(created_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_in_family(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenealogyTree>(
            r#"
            SELECT id, family_id, name, description, created_by, created_at, updated_at
            FROM genealogy_trees
            WHERE id = $1 AND family_id = $2
            "#,
        )
        .bind(id)
        .bind(family_id)
        .fetch_optional(pool)
        .await
    }

    /// Locks the tree row for the rest of the transaction
    ///
    /// Parent changes take this lock before reading the tree's links, so
    /// two of them can't each pass the cycle check against stale links.
    pub async fn lock<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let locked: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM genealogy_trees WHERE id = $1 AND family_id = $2 FOR NO KEY UPDATE",
        )
        .bind(id)
        .bind(family_id)
        .fetch_optional(executor)
        .await?;

        Ok(locked.is_some())
    }

    pub async fn list_by_family(pool: &PgPool, family_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenealogyTree>(
            r#"
            SELECT id, family_id, name, description, created_by, created_at, updated_at
            FROM genealogy_trees
            WHERE family_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(family_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
        name: Option<String>,
        description: Option<Option<String>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GenealogyTree>(
            r#"
            UPDATE genealogy_trees
            SET name = COALESCE($3, name),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                updated_at = NOW()
            WHERE id = $1 AND family_id = $2
            RETURNING id, family_id, name, description, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(family_id)
        .bind(name.map(|n| n.trim().to_string()))
        .bind(description.is_some())
        .bind(description.flatten())
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, family_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM genealogy_trees WHERE id = $1 AND family_id = $2")
            .bind(id)
            .bind(family_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Tree with its members assembled into a forest
    pub async fn load_detail(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<Option<TreeDetail>, sqlx::Error> {
        let Some(tree) = Self::find_in_family(pool, family_id, id).await? else {
            return Ok(None);
        };

        let members = TreeMember::list_by_tree(pool, tree.id).await?;
        let member_count = members.len();

        Ok(Some(TreeDetail {
            tree,
            member_count,
            roots: build_forest(members),
        }))
    }
}

impl TreeMember {
    pub async fn list_by_tree(pool: &PgPool, tree_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TreeMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM tree_members WHERE tree_id = $1"
        ))
        .bind(tree_id)
        .fetch_all(pool)
        .await
    }

    /// Current parent of every member of the tree
    pub async fn parent_links<'e, E: PgExecutor<'e>>(
        executor: E,
        tree_id: Uuid,
    ) -> Result<HashMap<Uuid, Option<Uuid>>, sqlx::Error> {
        let rows: Vec<(Uuid, Option<Uuid>)> =
            sqlx::query_as("SELECT id, parent_id FROM tree_members WHERE tree_id = $1")
                .bind(tree_id)
                .fetch_all(executor)
                .await?;

        Ok(rows.into_iter().collect())
    }

    pub async fn find_in_tree<'e, E: PgExecutor<'e>>(
        executor: E,
        tree_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TreeMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM tree_members WHERE id = $1 AND tree_id = $2"
        ))
        .bind(id)
        .bind(tree_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn create(
        pool: &PgPool,
        tree_id: Uuid,
        fields: MemberFields,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TreeMember>(&format!(
            r#"
            INSERT INTO tree_members
                (tree_id, parent_id, first_name, last_name, gender, birth_date, death_date, birth_place, bio)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(tree_id)
        .bind(fields.parent_id)
        .bind(fields.first_name.trim())
        .bind(fields.last_name)
        .bind(fields.gender)
        .bind(fields.birth_date)
        .bind(fields.death_date)
        .bind(fields.birth_place)
        .bind(fields.bio)
        .fetch_one(pool)
        .await
    }

    /// Overwrites every editable column with `fields`
    pub async fn replace<'e, E: PgExecutor<'e>>(
        executor: E,
        tree_id: Uuid,
        id: Uuid,
        fields: MemberFields,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TreeMember>(&format!(
            r#"
            UPDATE tree_members
            SET parent_id = $3, first_name = $4, last_name = $5, gender = $6,
                birth_date = $7, death_date = $8, birth_place = $9, bio = $10,
                updated_at = NOW()
            WHERE id = $1 AND tree_id = $2
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tree_id)
        .bind(fields.parent_id)
        .bind(fields.first_name.trim())
        .bind(fields.last_name)
        .bind(fields.gender)
        .bind(fields.birth_date)
        .bind(fields.death_date)
        .bind(fields.birth_place)
        .bind(fields.bio)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete(pool: &PgPool, tree_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tree_members WHERE id = $1 AND tree_id = $2")
            .bind(id)
            .bind(tree_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(first_name: &str, parent_id: Option<Uuid>, birth: Option<(i32, u32, u32)>) -> TreeMember {
        TreeMember {
            id: Uuid::new_v4(),
            tree_id: Uuid::nil(),
            parent_id,
            first_name: first_name.to_string(),
            last_name: None,
            gender: Gender::Unknown,
            birth_date: birth.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            death_date: None,
            birth_place: None,
            bio: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn count_nodes(nodes: &[TreeNode]) -> usize {
        nodes.iter().map(|n| 1 + count_nodes(&n.children)).sum()
    }

    #[test]
    fn test_deep_lineage_does_not_recurse() {
        const GENERATIONS: usize = 100_000;

        let mut members = Vec::with_capacity(GENERATIONS);
        let mut parent = None;
        for i in 0..GENERATIONS {
            let m = member(&format!("G{}", i), parent, None);
            parent = Some(m.id);
            members.push(m);
        }
        let first = members[0].id;
        let last = members[GENERATIONS - 1].id;
        members.reverse();

        let forest = build_forest(members);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].member.id, first);

        let mut depth = 1;
        let mut node = &forest[0];
        while let Some(child) = node.children.first() {
            assert_eq!(node.children.len(), 1);
            node = child;
            depth += 1;
        }
        assert_eq!(depth, GENERATIONS);
        assert_eq!(node.member.id, last);
    }

    #[test]
    fn test_build_simple_hierarchy() {
        let grandpa = member("Bao", None, Some((1920, 1, 1)));
        let son = member("Minh", Some(grandpa.id), Some((1950, 5, 2)));
        let grandson = member("Long", Some(son.id), Some((1980, 3, 3)));

        let forest = build_forest(vec![grandson.clone(), grandpa.clone(), son.clone()]);

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].member.id, grandpa.id);
        assert_eq!(forest[0].children[0].member.id, son.id);
        assert_eq!(forest[0].children[0].children[0].member.id, grandson.id);
    }

    #[test]
    fn test_children_sorted_by_birth_then_name() {
        let parent = member("Parent", None, None);
        let late = member("Anh", Some(parent.id), Some((1990, 1, 1)));
        let early = member("Zung", Some(parent.id), Some((1985, 1, 1)));
        let unknown = member("Binh", Some(parent.id), None);
        let twin_b = member("Cuc", Some(parent.id), Some((1985, 1, 1)));

        let forest = build_forest(vec![parent, late, unknown, early, twin_b]);
        let names: Vec<&str> = forest[0]
            .children
            .iter()
            .map(|c| c.member.first_name.as_str())
            .collect();

        assert_eq!(names, vec!["Cuc", "Zung", "Anh", "Binh"]);
    }

    #[test]
    fn test_parent_outside_row_set_becomes_root() {
        let orphan = member("Lan", Some(Uuid::new_v4()), None);
        let forest = build_forest(vec![orphan.clone()]);

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].member.id, orphan.id);
    }

    #[test]
    fn test_multiple_roots() {
        let a = member("A", None, Some((1900, 1, 1)));
        let b = member("B", None, Some((1901, 1, 1)));
        let forest = build_forest(vec![b, a]);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].member.first_name, "A");
    }

    #[test]
    fn test_cycle_members_emitted_once() {
        let mut a = member("A", None, None);
        let mut b = member("B", None, None);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let root = member("Root", None, None);

        let forest = build_forest(vec![a, b, root]);
        assert_eq!(count_nodes(&forest), 3);
    }

    #[test]
    fn test_cycle_keeps_hanging_subtree() {
        let mut a = member("A", None, None);
        let mut b = member("B", None, None);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let c = member("C", Some(a.id), None);

        let forest = build_forest(vec![c, b, a.clone()]);

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].member.id, a.id);
        assert_eq!(forest[0].children.len(), 2);
        assert_eq!(count_nodes(&forest), 3);
    }

    #[test]
    fn test_self_parent_treated_as_root() {
        let mut me = member("Self", None, None);
        me.parent_id = Some(me.id);

        let forest = build_forest(vec![me]);
        assert_eq!(forest.len(), 1);
        assert!(forest[0].children.is_empty());
    }

    #[test]
    fn test_would_create_cycle() {
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let parents = HashMap::from([(a, None), (b, Some(a)), (c, Some(b)), (d, None)]);

        assert!(would_create_cycle(&parents, a, a));
        assert!(would_create_cycle(&parents, a, c));
        assert!(would_create_cycle(&parents, b, c));
        assert!(!would_create_cycle(&parents, c, a));
        assert!(!would_create_cycle(&parents, a, d));
    }

    #[test]
    fn test_would_create_cycle_terminates_on_existing_loop() {
        let (x, y, z) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let parents = HashMap::from([(x, Some(y)), (y, Some(x)), (z, None)]);

        assert!(!would_create_cycle(&parents, z, x));
    }

    #[test]
    fn test_dates_consistent() {
        let mut fields = MemberFields {
            first_name: "Mai".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1950, 1, 1),
            death_date: NaiveDate::from_ymd_opt(2000, 1, 1),
            ..Default::default()
        };
        assert!(fields.dates_consistent());

        fields.death_date = NaiveDate::from_ymd_opt(1949, 12, 31);
        assert!(!fields.dates_consistent());

        fields.birth_date = None;
        assert!(fields.dates_consistent());
    }
}
