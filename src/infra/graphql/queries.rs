//! pg_graphql operations.

const POST_FIELDS: &str = r#"
fragment PostFields on posts {
  id
  title
  body
  created_at
  updated_at
  published
  user_id
  profile_id
  user: profiles {
    ...ProfileFields
  }
}
"#;

const PROFILE_FIELDS: &str = r#"
fragment ProfileFields on profiles {
  id
  username
  display_name
  avatar_url
  bio
  website
  created_at
}
"#;

const POSTS: &str = r#"
query Posts($first: Int!, $after: Cursor, $filter: postsFilter) {
  postsCollection(
    filter: $filter
    orderBy: [{ created_at: DescNullsLast }, { id: DescNullsLast }]
    first: $first
    after: $after
  ) {
    edges {
      node {
        ...PostFields
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
"#;

const POST_BY_ID: &str = r#"
query PostById($id: UUID!) {
  postsCollection(filter: { id: { eq: $id } }) {
    edges {
      node {
        ...PostFields
      }
    }
  }
}
"#;

const CREATE_POST: &str = r#"
mutation CreatePost($title: String!, $body: String!, $published: Boolean!, $user_id: UUID!) {
  insertIntopostsCollection(
    objects: [{ title: $title, body: $body, published: $published, user_id: $user_id, profile_id: $user_id }]
  ) {
    records {
      ...PostFields
    }
  }
}
"#;

const UPDATE_POST: &str = r#"
mutation UpdatePost($id: UUID!, $set: postsUpdateInput!) {
  updatepostsCollection(set: $set, filter: { id: { eq: $id } }) {
    records {
      ...PostFields
    }
  }
}
"#;

pub(super) const DELETE_POST: &str = r#"
mutation DeletePost($id: UUID!) {
  deleteFrompostsCollection(filter: { id: { eq: $id } }) {
    records {
      id
    }
  }
}
"#;

const PROFILE_BY_ID: &str = r#"
query ProfileById($id: UUID!) {
  profilesCollection(filter: { id: { eq: $id } }) {
    edges {
      node {
        ...ProfileFields
      }
    }
  }
}
"#;

const UPDATE_PROFILE: &str = r#"
mutation UpdateProfile($id: UUID!, $set: profilesUpdateInput!) {
  updateprofilesCollection(set: $set, filter: { id: { eq: $id } }) {
    records {
      ...ProfileFields
    }
  }
}
"#;

/// An operation together with the fragments it spreads.
fn with_post_fragments(operation: &str) -> String {
    format!("{operation}{POST_FIELDS}{PROFILE_FIELDS}")
}

fn with_profile_fragment(operation: &str) -> String {
    format!("{operation}{PROFILE_FIELDS}")
}

pub(super) fn posts() -> String {
    with_post_fragments(POSTS)
}

pub(super) fn post_by_id() -> String {
    with_post_fragments(POST_BY_ID)
}

pub(super) fn create_post() -> String {
    with_post_fragments(CREATE_POST)
}

pub(super) fn update_post() -> String {
    with_post_fragments(UPDATE_POST)
}

pub(super) fn profile_by_id() -> String {
    with_profile_fragment(PROFILE_BY_ID)
}

pub(super) fn update_profile() -> String {
    with_profile_fragment(UPDATE_PROFILE)
}
