use std::collections::HashSet;
use std::sync::Arc;

use nexus_cache::L1Cache;
use nexus_core::{deny_relation, ObjectRef, RewriteRule, Subject, ZoneId};
use nexus_index::TigerCache;
use nexus_store::{SharedIdentityMap, TupleStore};

use crate::config::EngineConfig;
use crate::coordinator::WriteThroughCoordinator;
use crate::error::Result;
use crate::schema::SchemaRegistry;

/// A single node visited during one `check`/`expand` call:
/// `(subject, permission, object)`. Revisiting one is a cycle — spec.md
/// §4.5 step 6 and the "cycle safety" invariant (§8) both require this
/// terminate every call, including against deliberately cyclic
/// group-membership graphs.
type VisitKey = (Subject, String, ObjectRef);

/// Recursive-with-memoization userset-rewrite evaluator (spec.md §4.5).
///
/// The graph recursion here — following `tuple_to_userset` parent edges and
/// userset-as-subject membership — is native `async` recursion guarded by
/// a per-call visited set, the same boxed-future shape
/// `ciam-authz::engine::PolicyEngine::check_recursive` already used; the
/// visited set is what bounds it on cyclic or deep group nests. See
/// DESIGN.md for why this, rather than a hand-flattened worklist, is the
/// resolution adopted for spec.md §9's "iterative worklist" design note.
pub struct CheckEngine {
    store: TupleStore,
    l1: Arc<L1Cache>,
    l2: Arc<TigerCache>,
    identity: SharedIdentityMap,
    schemas: Arc<SchemaRegistry>,
    coordinator: Arc<WriteThroughCoordinator>,
    config: EngineConfig,
}

impl CheckEngine {
    pub fn new(
        store: TupleStore,
        l1: Arc<L1Cache>,
        l2: Arc<TigerCache>,
        identity: SharedIdentityMap,
        schemas: Arc<SchemaRegistry>,
        coordinator: Arc<WriteThroughCoordinator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            l1,
            l2,
            identity,
            schemas,
            coordinator,
            config,
        }
    }

    /// Public entry point. Fail-closed per spec.md §7: any engine error —
    /// an unreachable store, an unconfigured zone, a storage hiccup mid
    /// traversal — becomes `false`, never `true`. This is the one place in
    /// the crate allowed to swallow a `Result::Err` into a plain `bool`.
    pub async fn check(
        &self,
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
    ) -> bool {
        if !self.config.enforce_permissions {
            return true;
        }

        let mut visited = HashSet::new();
        match self.check_inner(subject, permission, object, zone, &mut visited).await {
            Ok(allow) => allow,
            Err(err) => {
                tracing::warn!(
                    %subject, %permission, object = %object, %zone,
                    error = %err,
                    "check failed, failing closed to deny"
                );
                false
            }
        }
    }

    /// Batches a set of checks, deduplicating identical `(subject,
    /// permission, object)` triples so a repeated sub-query across the
    /// batch is evaluated once. Per spec.md §4.5, must agree with
    /// per-check evaluation for every entry.
    pub async fn check_bulk(
        &self,
        requests: &[(Subject, String, ObjectRef)],
        zone: ZoneId,
    ) -> Vec<bool> {
        let mut cache: std::collections::HashMap<(Subject, String, ObjectRef), bool> =
            std::collections::HashMap::new();
        let mut out = Vec::with_capacity(requests.len());
        for (subject, permission, object) in requests {
            let key = (subject.clone(), permission.clone(), object.clone());
            let allow = if let Some(&cached) = cache.get(&key) {
                cached
            } else {
                let allow = self.check(subject, permission, object, zone).await;
                cache.insert(key, allow);
                allow
            };
            out.push(allow);
        }
        out
    }

    /// Core recursive evaluator. Unlike [`Self::check`], errors propagate:
    /// callers inside the traversal (and the coordinator, for
    /// write-through bookkeeping) need to distinguish "denied" from
    /// "couldn't determine", even though the outermost [`Self::check`]
    /// folds both into `false`.
    fn check_inner<'a>(
        &'a self,
        subject: &'a Subject,
        permission: &'a str,
        object: &'a ObjectRef,
        zone: ZoneId,
        visited: &'a mut HashSet<VisitKey>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool>> + 'a + Send>> {
        Box::pin(async move {
            let visit_key = (subject.clone(), permission.to_string(), object.clone());
            if visited.contains(&visit_key) {
                return Ok(false); // cycle: spec.md §4.5 step 6, §9 cycle safety
            }
            visited.insert(visit_key);

            // 1. L1.
            if let Some(decision) = self.l1.get(subject, permission, object, zone).await? {
                return Ok(decision.is_allow());
            }

            // 2. Deny shortcut. Deny wins globally: any matching deny
            // anywhere in the traversal yields false (spec.md §4.5 tie-break).
            if self.config.deny_precedence
                && self.matches_deny(subject, permission, object, zone, visited).await?
            {
                self.coordinator.record(subject, permission, object, zone, false).await?;
                return Ok(false);
            }

            // 3. L2 positive hit.
            if self.config.l2_enabled {
                let object_int_id = self.identity.intern(zone, object).await?;
                if let Some(true) =
                    self.l2.check_access(subject, permission, &object.object_type, zone, object_int_id)
                {
                    self.coordinator.record(subject, permission, object, zone, true).await?;
                    return Ok(true);
                }
            }

            // 4-5. Userset rewrite (includes public-subject handling, folded
            // into `matches_grant`'s direct-tuple sweep).
            let allow = match self
                .schemas
                .schema_for(zone)
                .and_then(|s| s.rewrite_for(object.object_type.as_str(), permission).cloned())
            {
                Some(rule) => self.evaluate_rule(&rule, subject, permission, object, zone, visited).await?,
                None => false,
            };

            // Write-through (spec.md §4.6): the coordinator puts the
            // decision in L1 unconditionally and, for an allow, resolves
            // the object's int-id and adds it to the L2 bitmap.
            self.coordinator.record(subject, permission, object, zone, allow).await?;

            Ok(allow)
        })
    }

    fn evaluate_rule<'a>(
        &'a self,
        rule: &'a RewriteRule,
        subject: &'a Subject,
        permission: &'a str,
        object: &'a ObjectRef,
        zone: ZoneId,
        visited: &'a mut HashSet<VisitKey>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool>> + 'a + Send>> {
        Box::pin(async move {
            match rule {
                RewriteRule::This => self.matches_grant(subject, permission, object, zone, visited).await,
                RewriteRule::ComputedUserset(c) => {
                    self.check_inner(subject, &c.relation, object, zone, visited).await
                }
                RewriteRule::TupleToUserset(ttu) => {
                    let as_subject = Subject::principal(
                        object.object_type.clone(),
                        object.object_id.clone(),
                    );
                    let parents = self
                        .store
                        .read_by_subject(zone, &as_subject, &ttu.tupleset_relation, self.config.enforce_zone_isolation)
                        .await?;
                    for parent_tuple in parents {
                        if self
                            .check_inner(
                                subject,
                                &ttu.computed_userset_relation,
                                &parent_tuple.object,
                                zone,
                                visited,
                            )
                            .await?
                        {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                RewriteRule::Union(children) => {
                    for child in children {
                        if self.evaluate_rule(child, subject, permission, object, zone, visited).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                RewriteRule::Intersection(children) => {
                    if children.is_empty() {
                        return Ok(false);
                    }
                    for child in children {
                        if !self.evaluate_rule(child, subject, permission, object, zone, visited).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                RewriteRule::Exclusion { base, subtract } => {
                    if !self.evaluate_rule(base, subject, permission, object, zone, visited).await? {
                        return Ok(false);
                    }
                    Ok(!self.evaluate_rule(subtract, subject, permission, object, zone, visited).await?)
                }
            }
        })
    }

    /// The `this` base case: direct tuples naming `(object, permission)`.
    /// A tuple whose subject is a concrete principal matches only that
    /// exact subject; a tuple whose subject is a userset
    /// (`subject_relation.is_some()`) recurses into membership of that
    /// userset; the public role (`role:public#member`) matches everyone
    /// unconditionally (spec.md §4.5 step 5).
    async fn matches_grant(
        &self,
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
        visited: &mut HashSet<VisitKey>,
    ) -> Result<bool> {
        let tuples = self
            .store
            .read_by_object(zone, object, permission, self.config.enforce_zone_isolation)
            .await?;
        for tuple in tuples {
            if self.subject_matches(&tuple.subject, subject, zone, visited).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Analogous to [`Self::matches_grant`] but over deny tuples
    /// (`!permission`). A deny with a userset subject blocks every
    /// transitive member of that userset, same as a grant would admit them.
    async fn matches_deny(
        &self,
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
        visited: &mut HashSet<VisitKey>,
    ) -> Result<bool> {
        let tuples = self
            .store
            .read_by_object(zone, object, &deny_relation(permission), self.config.enforce_zone_isolation)
            .await?;
        for tuple in tuples {
            if self.subject_matches(&tuple.subject, subject, zone, visited).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Does `requested` satisfy being `tuple_subject`? Three cases: the
    /// public role (everyone matches), an exact concrete-principal match,
    /// or — when `tuple_subject` is itself a userset — recursion into
    /// whether `requested` holds `tuple_subject`'s relation on its anchor
    /// object.
    fn subject_matches<'a>(
        &'a self,
        tuple_subject: &'a Subject,
        requested: &'a Subject,
        zone: ZoneId,
        visited: &'a mut HashSet<VisitKey>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool>> + 'a + Send>> {
        Box::pin(async move {
            if tuple_subject.is_public() {
                return Ok(true);
            }
            if !tuple_subject.is_userset() {
                return Ok(tuple_subject == requested);
            }
            let userset_relation = tuple_subject
                .subject_relation
                .as_deref()
                .expect("is_userset implies subject_relation is Some");
            let userset_object = ObjectRef::new(
                tuple_subject.subject_type.clone(),
                tuple_subject.subject_id.clone(),
            );
            self.check_inner(requested, userset_relation, &userset_object, zone, visited)
                .await
        })
    }

    /// Direct L2 read for the Admin/Bulk Interface's `accessible_resources`
    /// (spec.md §4.7): the resource int-ids materialized so far for this
    /// `(subject, permission, object_type)` slice. Empty, not an error,
    /// when nothing has been materialized yet — callers after a guaranteed-
    /// complete answer should `check` each candidate instead.
    pub fn accessible_resources(
        &self,
        subject: &Subject,
        permission: &str,
        object_type: &nexus_core::TypeName,
        zone: ZoneId,
    ) -> roaring::RoaringTreemap {
        self.l2.get_accessible(subject, permission, object_type, zone)
    }

    /// Flattens the set of leaf (non-userset) subjects satisfying
    /// `permission` on `object`. Ordering is unspecified (spec.md §9 Open
    /// Questions: source is silent, so callers must tolerate any order).
    pub async fn expand(
        &self,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
    ) -> Result<Vec<Subject>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        self.expand_inner(permission, object, zone, &mut out, &mut seen, &mut visited)
            .await?;
        Ok(out)
    }

    fn expand_inner<'a>(
        &'a self,
        permission: &'a str,
        object: &'a ObjectRef,
        zone: ZoneId,
        out: &'a mut Vec<Subject>,
        seen: &'a mut HashSet<Subject>,
        visited: &'a mut HashSet<VisitKey>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a + Send>> {
        Box::pin(async move {
            let rule = match self
                .schemas
                .schema_for(zone)
                .and_then(|s| s.rewrite_for(object.object_type.as_str(), permission).cloned())
            {
                Some(rule) => rule,
                None => return Ok(()),
            };
            self.expand_rule(&rule, permission, object, zone, out, seen, visited).await
        })
    }

    fn expand_rule<'a>(
        &'a self,
        rule: &'a RewriteRule,
        permission: &'a str,
        object: &'a ObjectRef,
        zone: ZoneId,
        out: &'a mut Vec<Subject>,
        seen: &'a mut HashSet<Subject>,
        visited: &'a mut HashSet<VisitKey>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a + Send>> {
        Box::pin(async move {
            match rule {
                RewriteRule::This => {
                    let tuples = self
                        .store
                        .read_by_object(zone, object, permission, self.config.enforce_zone_isolation)
                        .await?;
                    for tuple in tuples {
                        self.expand_subject(&tuple.subject, zone, out, seen, visited).await?;
                    }
                    Ok(())
                }
                RewriteRule::ComputedUserset(c) => {
                    self.expand_inner(&c.relation, object, zone, out, seen, visited).await
                }
                RewriteRule::TupleToUserset(ttu) => {
                    let as_subject = Subject::principal(
                        object.object_type.clone(),
                        object.object_id.clone(),
                    );
                    let parents = self
                        .store
                        .read_by_subject(zone, &as_subject, &ttu.tupleset_relation, self.config.enforce_zone_isolation)
                        .await?;
                    for parent_tuple in parents {
                        self.expand_inner(
                            &ttu.computed_userset_relation,
                            &parent_tuple.object,
                            zone,
                            out,
                            seen,
                            visited,
                        )
                        .await?;
                    }
                    Ok(())
                }
                RewriteRule::Union(children) | RewriteRule::Intersection(children) => {
                    // `expand` flattens every path that could contribute a
                    // leaf subject; intersection/exclusion's narrowing is a
                    // `check`-time concern, not a set-membership one, so
                    // both collect the same way union does.
                    for child in children {
                        self.expand_rule(child, permission, object, zone, out, seen, visited)
                            .await?;
                    }
                    Ok(())
                }
                RewriteRule::Exclusion { base, .. } => {
                    self.expand_rule(base, permission, object, zone, out, seen, visited).await
                }
            }
        })
    }

    fn expand_subject<'a>(
        &'a self,
        tuple_subject: &'a Subject,
        zone: ZoneId,
        out: &'a mut Vec<Subject>,
        seen: &'a mut HashSet<Subject>,
        visited: &'a mut HashSet<VisitKey>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a + Send>> {
        Box::pin(async move {
            if !tuple_subject.is_userset() {
                if seen.insert(tuple_subject.clone()) {
                    out.push(tuple_subject.clone());
                }
                return Ok(());
            }
            let relation = tuple_subject
                .subject_relation
                .as_deref()
                .expect("is_userset implies subject_relation is Some")
                .to_string();
            let anchor = ObjectRef::new(
                tuple_subject.subject_type.clone(),
                tuple_subject.subject_id.clone(),
            );
            self.expand_inner(&relation, &anchor, zone, out, seen, visited).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{RelationSchema, RewriteSchema, TypeSchema};
    use uuid::Uuid;

    // `CheckEngine` wires a live `TupleStore` (Postgres-backed) together
    // with `L1Cache`/`TigerCache`/`ResourceIdentityMap`; the full
    // traversal scenarios from spec.md §8 are exercised end-to-end in the
    // `#[ignore]`d integration suite under `tests/`, against a real pool.
    // The pieces that don't need a store — schema lookup, deny-relation
    // naming, subject-equality semantics — are covered here.

    #[test]
    fn deny_relation_naming_is_consistent_with_core() {
        assert_eq!(deny_relation("read"), "!read");
    }

    #[test]
    fn schema_registry_resolves_direct_relation() {
        let registry = SchemaRegistry::new();
        let zone = ZoneId::new(Uuid::nil());
        registry.set_schema(
            zone,
            RewriteSchema::new()
                .with_type(TypeSchema::new("document").with_relation("viewer", RelationSchema::direct())),
        );
        assert_eq!(
            registry.schema_for(zone).unwrap().rewrite_for("document", "viewer"),
            Some(&RewriteRule::This)
        );
    }

    #[test]
    fn tiger_cache_never_serves_a_negative_answer() {
        let l2 = TigerCache::new(100);
        let subject = Subject::principal("user", "alice");
        let object_type = nexus_core::TypeName::new("document");
        let zone = ZoneId::new(Uuid::nil());
        assert_eq!(l2.check_access(&subject, "read", &object_type, zone, 1), None);
    }

    #[test]
    fn public_subject_is_recognized_independent_of_case() {
        let s = Subject::public();
        assert!(s.is_public());
        assert!(s.is_userset());
    }
}
